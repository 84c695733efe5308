//! Dashboard pipeline: resolve periods, fetch rows, aggregate, cut by
//! headcount, sort, truncate, shape the response.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::infrastructure::state::AppState;

use super::aggregation::{aggregate, round2, Aggregate};
use super::errors::ServiceError;
use super::headcount::{self, HeadcountScope};
use super::periods::{group_by_year, PeriodResolver};
use super::sorting::{sort_clients, truncate};
use super::{ParsedRequest, ReportParams};

pub const NO_DATA_MESSAGE: &str = "No data found for selected filters.";

#[derive(Debug, Serialize, PartialEq)]
pub struct PeriodGroup {
    pub year: i32,
    pub months: Vec<u32>,
}

#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    pub selected_periods: Vec<PeriodGroup>,
    pub total_clients: usize,
    pub total_headcount: usize,
    pub total_days: f64,
    pub total_allowance: f64,
}

#[derive(Debug, Serialize)]
pub struct DashboardClient {
    pub client: String,
    pub client_partner: String,
    pub departments: usize,
    pub headcount: usize,
    pub total_days: f64,
    pub total_allowance: f64,
}

#[derive(Debug, Serialize)]
pub struct DashboardPartnerClient {
    pub client: String,
    pub headcount: usize,
    pub total_allowance: f64,
}

#[derive(Debug, Serialize)]
pub struct DashboardPartner {
    pub client_partner: String,
    pub clients: Vec<DashboardPartnerClient>,
    pub headcount: usize,
    pub total_allowance: f64,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub summary: DashboardSummary,
    pub clients: Vec<DashboardClient>,
    pub partners: Vec<DashboardPartner>,
    pub messages: Vec<String>,
}

pub struct DashboardService {
    pub state: Arc<AppState>,
}

impl DashboardService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub async fn dashboard(
        &self,
        params: ReportParams,
    ) -> Result<DashboardResponse, ServiceError> {
        let today = Utc::now().date_naive();
        let parsed = params.parse(&self.state.catalog, today)?;
        self.run(&parsed, today).await
    }

    pub(crate) async fn run(
        &self,
        parsed: &ParsedRequest,
        today: chrono::NaiveDate,
    ) -> Result<DashboardResponse, ServiceError> {
        let resolver = PeriodResolver::new(self.state.rows.as_ref(), today);
        let resolved = resolver
            .resolve(&parsed.years, &parsed.months, &parsed.filters)
            .await?;
        let mut messages = resolved.messages;

        let rows = self
            .state
            .rows
            .fetch_rows(&resolved.periods, &parsed.filters)
            .await?;
        let mut agg = aggregate(&rows, &self.state.catalog, &parsed.filters.shifts);

        headcount::apply(
            &mut agg,
            HeadcountScope::from_filters(&parsed.filters),
            parsed.filters.headcounts.as_deref(),
        );

        // Summary totals cover everything that survived the headcount cut;
        // top-N only trims the listing below.
        let summary = summarize(&agg, &resolved.periods);

        sort_clients(&mut agg.clients, parsed.sort_by, parsed.sort_order);
        truncate(&mut agg.clients, parsed.top);

        if agg.is_empty() {
            messages.push(NO_DATA_MESSAGE.to_string());
        }

        Ok(build_response(&agg, summary, messages))
    }
}

fn summarize(agg: &Aggregate, periods: &[crate::domain::models::Period]) -> DashboardSummary {
    let selected_periods = group_by_year(periods)
        .into_iter()
        .map(|(year, months)| PeriodGroup { year, months })
        .collect();

    let mut employee_ids = std::collections::HashSet::new();
    let mut total_days = 0.0;
    let mut total_allowance = 0.0;
    for client in &agg.clients {
        employee_ids.extend(client.employee_ids.iter().cloned());
        total_days += client.total_days;
        total_allowance += client.total_allowance;
    }

    DashboardSummary {
        selected_periods,
        total_clients: agg.clients.len(),
        total_headcount: employee_ids.len(),
        total_days: round2(total_days),
        total_allowance: round2(total_allowance),
    }
}

fn build_response(
    agg: &Aggregate,
    summary: DashboardSummary,
    messages: Vec<String>,
) -> DashboardResponse {
    let clients: Vec<DashboardClient> = agg
        .clients
        .iter()
        .map(|c| DashboardClient {
            client: c.name.clone(),
            client_partner: c.client_partner.clone(),
            departments: c.department_count(),
            headcount: c.headcount(),
            total_days: round2(c.total_days),
            total_allowance: round2(c.total_allowance),
        })
        .collect();

    let partners: Vec<DashboardPartner> = agg
        .partners
        .iter()
        .map(|p| DashboardPartner {
            client_partner: p.name.clone(),
            clients: p
                .clients
                .iter()
                .map(|pc| DashboardPartnerClient {
                    client: pc.name.clone(),
                    headcount: pc.employee_ids.len(),
                    total_allowance: round2(pc.total_allowance),
                })
                .collect(),
            headcount: p.headcount(),
            total_allowance: round2(p.total_allowance),
        })
        .collect();

    DashboardResponse {
        summary,
        clients,
        partners,
        messages,
    }
}
