//! Employee-level search: per-employee shift totals across the resolved
//! periods, with headcount group filtering, sorting, and pagination.
//!
//! Unlike the dashboard, allowance amounts here are recomputed from the
//! rate table so a rate correction shows up without re-ingesting rows.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::domain::filters::{clean_str, HeadcountRange, SortBy, SortOrder};
use crate::domain::models::{Period, RateTable};
use crate::infrastructure::state::AppState;

use super::aggregation::{employee_identity, round2, ShiftTotals};
use super::errors::ServiceError;
use super::headcount::HeadcountScope;
use super::periods::PeriodResolver;
use super::{ParsedRequest, ReportParams};

pub const NO_RECORDS_MESSAGE: &str = "No records found for the selected filters.";

#[derive(Debug, Serialize)]
pub struct SearchShiftTotal {
    pub shift: String,
    pub label: String,
    pub days: f64,
    pub allowance: f64,
}

#[derive(Debug, Serialize)]
pub struct SearchEmployee {
    pub employee_id: String,
    pub employee_name: String,
    pub client: String,
    pub department: String,
    pub client_partner: String,
    pub shifts: Vec<SearchShiftTotal>,
    pub total_days: f64,
    pub total_allowance: f64,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    /// Matching employees before pagination.
    pub total: usize,
    pub start: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    pub shift_totals: Vec<SearchShiftTotal>,
    pub employees: Vec<SearchEmployee>,
    pub messages: Vec<String>,
}

struct EmployeeAcc {
    identity: String,
    employee_id: String,
    employee_name: String,
    client: String,
    department: String,
    client_partner: String,
    latest: Period,
    shifts: ShiftTotals,
    total_days: f64,
    total_allowance: f64,
}

pub struct SearchService {
    pub state: Arc<AppState>,
}

impl SearchService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub async fn search(&self, params: ReportParams) -> Result<SearchResponse, ServiceError> {
        let today = Utc::now().date_naive();
        let parsed = params.parse(&self.state.catalog, today)?;
        self.run(&parsed, today).await
    }

    pub(crate) async fn run(
        &self,
        parsed: &ParsedRequest,
        today: chrono::NaiveDate,
    ) -> Result<SearchResponse, ServiceError> {
        let resolver = PeriodResolver::new(self.state.rows.as_ref(), today);
        let resolved = resolver
            .resolve(&parsed.years, &parsed.months, &parsed.filters)
            .await?;

        let rows = self
            .state
            .rows
            .fetch_rows(&resolved.periods, &parsed.filters)
            .await?;
        let rates = self.state.rates.rate_table().await?;

        let mut employees = self.accumulate(&rows, &rates, parsed);
        apply_headcount(
            &mut employees,
            HeadcountScope::from_filters(&parsed.filters),
            parsed.filters.headcounts.as_deref(),
        );

        if employees.is_empty() {
            return Err(ServiceError::NotFound(NO_RECORDS_MESSAGE.to_string()));
        }

        sort_employees(&mut employees, parsed.sort_by, parsed.sort_order);

        let shift_totals = self.overall_totals(&employees);
        let total = employees.len();
        let page: Vec<&EmployeeAcc> = employees
            .iter()
            .skip(parsed.start)
            .take(parsed.limit.unwrap_or(usize::MAX))
            .collect();

        Ok(SearchResponse {
            total,
            start: parsed.start,
            limit: parsed.limit,
            shift_totals,
            employees: page
                .into_iter()
                .map(|e| SearchEmployee {
                    employee_id: e.employee_id.clone(),
                    employee_name: e.employee_name.clone(),
                    client: e.client.clone(),
                    department: e.department.clone(),
                    client_partner: e.client_partner.clone(),
                    shifts: self.shift_entries(&e.shifts),
                    total_days: round2(e.total_days),
                    total_allowance: round2(e.total_allowance),
                })
                .collect(),
            messages: resolved.messages,
        })
    }

    fn accumulate(
        &self,
        rows: &[crate::domain::models::AllowanceRow],
        rates: &RateTable,
        parsed: &ParsedRequest,
    ) -> Vec<EmployeeAcc> {
        let mut out: Vec<EmployeeAcc> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for row in rows {
            let shift_key = clean_str(&row.shift_type).to_uppercase();
            if !self.shift_accepted(&shift_key, parsed) {
                continue;
            }
            let amount = row.days * rates.amount(&shift_key, row.period.year);
            let identity = employee_identity(row);

            let idx = *index.entry(identity.clone()).or_insert_with(|| {
                out.push(EmployeeAcc {
                    identity: identity.clone(),
                    employee_id: row.employee_id.clone().unwrap_or_default(),
                    employee_name: row.employee_name.clone(),
                    client: row.client.clone(),
                    department: row.department.clone(),
                    client_partner: row.client_partner.clone(),
                    latest: row.period,
                    shifts: ShiftTotals::default(),
                    total_days: 0.0,
                    total_allowance: 0.0,
                });
                out.len() - 1
            });
            let acc = &mut out[idx];
            acc.shifts.add(&shift_key, row.days, amount);
            acc.total_days += row.days;
            acc.total_allowance += amount;
            // An employee's descriptive attributes follow their most recent
            // period's row.
            if !row.period.is_after(acc.latest) && row.period != acc.latest {
                continue;
            }
            acc.latest = row.period;
            acc.employee_name = row.employee_name.clone();
            acc.client = row.client.clone();
            acc.department = row.department.clone();
            acc.client_partner = row.client_partner.clone();
        }
        out
    }

    fn shift_accepted(&self, key: &str, parsed: &ParsedRequest) -> bool {
        if key.is_empty() {
            return false;
        }
        match parsed.filters.shifts.values() {
            Some(selected) => selected.iter().any(|s| s == key),
            None => self.state.catalog.is_empty() || self.state.catalog.contains(key),
        }
    }

    fn overall_totals(&self, employees: &[EmployeeAcc]) -> Vec<SearchShiftTotal> {
        let mut totals = ShiftTotals::default();
        for employee in employees {
            for (key, stat) in employee.shifts.iter() {
                totals.add(key, stat.days, stat.allowance);
            }
        }
        self.shift_entries(&totals)
    }

    fn shift_entries(&self, totals: &ShiftTotals) -> Vec<SearchShiftTotal> {
        totals
            .iter()
            .map(|(key, stat)| SearchShiftTotal {
                shift: key.to_string(),
                label: self.state.catalog.label(key).unwrap_or(key).to_string(),
                days: round2(stat.days),
                allowance: round2(stat.allowance),
            })
            .collect()
    }
}

/// Employees survive when the unique-employee count of their group (client,
/// or department when departments were explicitly selected) falls in at
/// least one requested range.
fn apply_headcount(
    employees: &mut Vec<EmployeeAcc>,
    scope: HeadcountScope,
    ranges: Option<&[HeadcountRange]>,
) {
    let Some(ranges) = ranges else { return };
    if ranges.is_empty() {
        return;
    }

    let counts = group_counts(employees, scope);
    employees.retain(|e| {
        let count = counts.get(&group_key(e, scope)).copied().unwrap_or(0);
        ranges.iter().any(|r| r.contains(count))
    });
}

fn group_counts(employees: &[EmployeeAcc], scope: HeadcountScope) -> HashMap<String, usize> {
    let mut members: HashMap<String, HashSet<&str>> = HashMap::new();
    for employee in employees {
        members
            .entry(group_key(employee, scope))
            .or_default()
            .insert(employee.identity.as_str());
    }
    members
        .into_iter()
        .map(|(key, ids)| (key, ids.len()))
        .collect()
}

fn group_key(employee: &EmployeeAcc, scope: HeadcountScope) -> String {
    match scope {
        HeadcountScope::Client => employee.client.trim().to_lowercase(),
        HeadcountScope::Department => format!(
            "{}|{}",
            employee.client.trim().to_lowercase(),
            employee.department.trim().to_lowercase()
        ),
    }
}

/// String keys default ascending, numeric keys default descending when the
/// caller names a key but leaves the order at `default` (this endpoint's
/// historical behavior). `departments` is a string key here: per employee it
/// sorts the department name, not a count. Ties always break on employee id.
fn sort_employees(employees: &mut [EmployeeAcc], sort_by: Option<SortBy>, order: SortOrder) {
    let Some(sort_by) = sort_by else { return };
    let descending = match order {
        SortOrder::Asc => false,
        SortOrder::Desc => true,
        SortOrder::Default => !matches!(sort_by, SortBy::Departments) && sort_by.is_numeric(),
    };

    employees.sort_by(|a, b| {
        let cmp = match sort_by {
            SortBy::Client => str_key(&a.client).cmp(&str_key(&b.client)),
            SortBy::ClientPartner => str_key(&a.client_partner).cmp(&str_key(&b.client_partner)),
            SortBy::Departments => str_key(&a.department).cmp(&str_key(&b.department)),
            SortBy::Headcount => a.total_days.total_cmp(&b.total_days),
            SortBy::TotalAllowance => a.total_allowance.total_cmp(&b.total_allowance),
        };
        let cmp = if descending { cmp.reverse() } else { cmp };
        cmp.then_with(|| a.employee_id.cmp(&b.employee_id))
    });
}

fn str_key(s: &str) -> String {
    s.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::AllowanceRow;

    fn acc(id: &str, client: &str, dept: &str, days: f64, allowance: f64) -> EmployeeAcc {
        EmployeeAcc {
            identity: id.to_uppercase(),
            employee_id: id.to_string(),
            employee_name: format!("Emp {id}"),
            client: client.to_string(),
            department: dept.to_string(),
            client_partner: "North".to_string(),
            latest: Period::new(2025, 6),
            shifts: ShiftTotals::default(),
            total_days: days,
            total_allowance: allowance,
        }
    }

    #[test]
    fn numeric_keys_default_to_descending() {
        let mut employees = vec![
            acc("E1", "Acme", "Data", 2.0, 100.0),
            acc("E2", "Acme", "Data", 5.0, 400.0),
        ];
        sort_employees(&mut employees, Some(SortBy::TotalAllowance), SortOrder::Default);
        assert_eq!(employees[0].employee_id, "E2");
    }

    #[test]
    fn string_keys_default_to_ascending() {
        let mut employees = vec![
            acc("E1", "Globex", "Data", 0.0, 0.0),
            acc("E2", "acme", "Data", 0.0, 0.0),
        ];
        sort_employees(&mut employees, Some(SortBy::Client), SortOrder::Default);
        assert_eq!(employees[0].employee_id, "E2");
    }

    #[test]
    fn department_name_defaults_to_ascending() {
        let mut employees = vec![
            acc("E1", "Acme", "Ops", 0.0, 0.0),
            acc("E2", "Acme", "data", 0.0, 0.0),
        ];
        sort_employees(&mut employees, Some(SortBy::Departments), SortOrder::Default);
        assert_eq!(employees[0].employee_id, "E2");
    }

    #[test]
    fn equal_sort_keys_break_on_employee_id() {
        let mut employees = vec![
            acc("E9", "Acme", "Data", 3.0, 100.0),
            acc("E1", "Acme", "Data", 3.0, 100.0),
        ];
        sort_employees(&mut employees, Some(SortBy::TotalAllowance), SortOrder::Desc);
        assert_eq!(employees[0].employee_id, "E1");
    }

    #[test]
    fn headcount_groups_filter_by_client_scope() {
        let mut employees = vec![
            acc("E1", "Acme", "Data", 1.0, 0.0),
            acc("E2", "Acme", "Ops", 1.0, 0.0),
            acc("E3", "Globex", "Data", 1.0, 0.0),
        ];
        apply_headcount(
            &mut employees,
            HeadcountScope::Client,
            Some(&[HeadcountRange { min: 2, max: 5 }]),
        );
        let ids: Vec<&str> = employees.iter().map(|e| e.employee_id.as_str()).collect();
        assert_eq!(ids, vec!["E1", "E2"]);
    }

    #[test]
    fn latest_row_wins_employee_attributes() {
        let state = test_state();
        let service = SearchService::new(state);
        let rows = vec![
            raw("E1", "Acme", "Data", Period::new(2025, 5)),
            raw("E1", "Globex", "Ops", Period::new(2025, 6)),
            raw("E1", "Acme", "Data", Period::new(2025, 4)),
        ];
        let parsed = ReportParams::default()
            .parse(&service.state.catalog, chrono::NaiveDate::from_ymd_opt(2025, 6, 15).unwrap())
            .unwrap();
        let employees = service.accumulate(&rows, &RateTable::default(), &parsed);
        assert_eq!(employees.len(), 1);
        assert_eq!(employees[0].client, "Globex");
        assert_eq!(employees[0].department, "Ops");
        assert_eq!(employees[0].total_days, 3.0);
    }

    fn raw(id: &str, client: &str, dept: &str, period: Period) -> AllowanceRow {
        AllowanceRow {
            employee_id: Some(id.to_string()),
            employee_name: format!("Emp {id}"),
            client: client.to_string(),
            department: dept.to_string(),
            client_partner: "North".to_string(),
            period,
            shift_type: "A".to_string(),
            days: 1.0,
            rate: 100.0,
        }
    }

    fn test_state() -> Arc<AppState> {
        use crate::infrastructure::cache::NoopCache;
        use crate::infrastructure::config::Config;
        use crate::infrastructure::source::MemorySource;

        let config = Arc::new(Config::for_tests());
        let source = Arc::new(MemorySource::new(Vec::new(), Vec::new()));
        Arc::new(AppState::new(
            config,
            source.clone(),
            source,
            Arc::new(NoopCache),
        ))
    }
}
