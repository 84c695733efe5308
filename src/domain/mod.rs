pub mod filters;
pub mod models;
