use std::sync::Arc;

use crate::domain::models::ShiftCatalog;
use crate::infrastructure::{
    cache::SummaryCache,
    config::Config,
    source::{RateSource, RowSource},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub rows: Arc<dyn RowSource>,
    pub rates: Arc<dyn RateSource>,
    pub cache: Arc<dyn SummaryCache>,
    pub catalog: ShiftCatalog,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        rows: Arc<dyn RowSource>,
        rates: Arc<dyn RateSource>,
        cache: Arc<dyn SummaryCache>,
    ) -> Self {
        let catalog = config.shift_catalog();
        Self {
            config,
            rows,
            rates,
            cache,
            catalog,
        }
    }
}
