//! Period-keyed nested summary (period -> client -> department -> employee)
//! with the result cache in front of the default request shape.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::domain::models::Period;
use crate::infrastructure::state::AppState;

use super::aggregation::{aggregate, round2, Aggregate, ShiftTotals};
use super::errors::ServiceError;
use super::headcount::{self, HeadcountScope};
use super::periods::PeriodResolver;
use super::{ParsedRequest, ReportParams};

#[derive(Debug, Serialize)]
pub struct ShiftEntry {
    pub shift: String,
    pub label: String,
    pub days: f64,
    pub allowance: f64,
}

#[derive(Debug, Serialize)]
pub struct EmployeeSummary {
    pub employee_id: String,
    pub employee_name: String,
    pub shifts: Vec<ShiftEntry>,
    pub total_days: f64,
    pub total_allowance: f64,
}

#[derive(Debug, Serialize)]
pub struct DepartmentSummary {
    pub department: String,
    pub headcount: usize,
    pub shifts: Vec<ShiftEntry>,
    pub total_days: f64,
    pub total_allowance: f64,
    pub employees: Vec<EmployeeSummary>,
}

#[derive(Debug, Serialize)]
pub struct ClientSummary {
    pub client: String,
    pub client_partner: String,
    pub headcount: usize,
    pub shifts: Vec<ShiftEntry>,
    pub total_days: f64,
    pub total_allowance: f64,
    pub departments: Vec<DepartmentSummary>,
}

#[derive(Debug, Serialize)]
pub struct MonthTotal {
    pub headcount: usize,
    pub total_days: f64,
    pub total_allowance: f64,
}

#[derive(Debug, Serialize)]
pub struct PeriodSummary {
    pub period: String,
    pub clients: Vec<ClientSummary>,
    pub month_total: MonthTotal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub periods: Vec<PeriodSummary>,
    pub messages: Vec<String>,
}

pub struct SummaryService {
    pub state: Arc<AppState>,
}

impl SummaryService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Returns the summary as JSON. The default request shape (no filters,
    /// no explicit periods, no reordering) is served from the cache, keyed
    /// by the resolved latest period plus the shift-catalog fingerprint so
    /// that new data or a catalog change invalidates stale entries.
    pub async fn summary(&self, params: ReportParams) -> Result<Value, ServiceError> {
        let today = Utc::now().date_naive();
        let parsed = params.parse(&self.state.catalog, today)?;
        self.run(&parsed, today).await
    }

    pub(crate) async fn run(
        &self,
        parsed: &ParsedRequest,
        today: chrono::NaiveDate,
    ) -> Result<Value, ServiceError> {
        let resolver = PeriodResolver::new(self.state.rows.as_ref(), today);
        let resolved = resolver
            .resolve(&parsed.years, &parsed.months, &parsed.filters)
            .await?;

        let cache_key = match resolved.periods.first() {
            Some(latest) if parsed.is_default_shape() => {
                let key = format!("summary:{latest}:{}", self.state.catalog.fingerprint());
                if let Some(hit) = self.state.cache.get(&key) {
                    debug!(%key, "summary cache hit");
                    return Ok(hit);
                }
                Some(key)
            }
            _ => None,
        };

        let rows = self
            .state
            .rows
            .fetch_rows(&resolved.periods, &parsed.filters)
            .await?;

        let mut periods = Vec::with_capacity(resolved.periods.len());
        for period in &resolved.periods {
            let period_rows: Vec<_> = rows
                .iter()
                .filter(|r| r.period == *period)
                .cloned()
                .collect();
            let mut agg = aggregate(&period_rows, &self.state.catalog, &parsed.filters.shifts);
            headcount::apply(
                &mut agg,
                HeadcountScope::from_filters(&parsed.filters),
                parsed.filters.headcounts.as_deref(),
            );
            periods.push(self.period_summary(*period, &agg));
        }

        let response = SummaryResponse {
            periods,
            messages: resolved.messages,
        };
        let value = serde_json::to_value(&response)
            .map_err(|err| ServiceError::Internal(err.to_string()))?;

        if let Some(key) = cache_key {
            self.state
                .cache
                .set(&key, value.clone(), self.state.config.cache_ttl());
        }
        Ok(value)
    }

    fn period_summary(&self, period: Period, agg: &Aggregate) -> PeriodSummary {
        let clients: Vec<ClientSummary> = agg
            .clients
            .iter()
            .map(|c| ClientSummary {
                client: c.name.clone(),
                client_partner: c.client_partner.clone(),
                headcount: c.headcount(),
                shifts: self.shift_entries(&c.shifts),
                total_days: round2(c.total_days),
                total_allowance: round2(c.total_allowance),
                departments: c
                    .departments
                    .iter()
                    .map(|d| DepartmentSummary {
                        department: d.name.clone(),
                        headcount: d.headcount(),
                        shifts: self.shift_entries(&d.shifts),
                        total_days: round2(d.total_days),
                        total_allowance: round2(d.total_allowance),
                        employees: d
                            .employees
                            .iter()
                            .map(|e| EmployeeSummary {
                                employee_id: e.employee_id.clone(),
                                employee_name: e.employee_name.clone(),
                                shifts: self.shift_entries(&e.shifts),
                                total_days: round2(e.total_days),
                                total_allowance: round2(e.total_allowance),
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        let mut employee_ids = std::collections::HashSet::new();
        let mut total_days = 0.0;
        let mut total_allowance = 0.0;
        for client in &agg.clients {
            employee_ids.extend(client.employee_ids.iter().cloned());
            total_days += client.total_days;
            total_allowance += client.total_allowance;
        }

        let message = if clients.is_empty() {
            Some(format!("No data found for {period}."))
        } else {
            None
        };

        PeriodSummary {
            period: period.to_string(),
            clients,
            month_total: MonthTotal {
                headcount: employee_ids.len(),
                total_days: round2(total_days),
                total_allowance: round2(total_allowance),
            },
            message,
        }
    }

    fn shift_entries(&self, totals: &ShiftTotals) -> Vec<ShiftEntry> {
        totals
            .iter()
            .map(|(key, stat)| ShiftEntry {
                shift: key.to_string(),
                label: self
                    .state
                    .catalog
                    .label(key)
                    .unwrap_or(key)
                    .to_string(),
                days: round2(stat.days),
                allowance: round2(stat.allowance),
            })
            .collect()
    }
}
