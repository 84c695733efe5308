pub mod aggregation;
pub mod dashboard;
pub mod errors;
pub mod headcount;
pub mod periods;
pub mod search;
pub mod sorting;
pub mod summary;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::domain::filters::{
    normalize_filter, normalize_shifts, parse_headcount_ranges, parse_months, parse_sort_by,
    parse_sort_order, parse_top, parse_years, FilterInput, FilterSet, ScalarInput, SortBy,
    SortOrder,
};
use crate::domain::models::ShiftCatalog;

use self::errors::ServiceError;

/// Raw request body shared by the reporting endpoints. Every field is
/// optional; absence means "no constraint".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReportParams {
    pub clients: Option<FilterInput>,
    pub departments: Option<FilterInput>,
    pub shifts: Option<FilterInput>,
    pub employees: Option<FilterInput>,
    pub partners: Option<FilterInput>,
    pub headcounts: Option<FilterInput>,
    pub years: Option<Vec<ScalarInput>>,
    pub months: Option<Vec<ScalarInput>>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub top: Option<ScalarInput>,
    pub start: Option<u32>,
    pub limit: Option<u32>,
}

/// Canonical form of a reporting request. Built once per request; every
/// stage after this assumes validity.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub filters: FilterSet,
    pub years: Vec<i32>,
    pub months: Vec<u32>,
    pub sort_by: Option<SortBy>,
    pub sort_order: SortOrder,
    pub top: Option<usize>,
    pub start: usize,
    pub limit: Option<usize>,
}

impl ReportParams {
    /// Validates and canonicalizes everything up front, before the first
    /// row-source query.
    pub fn parse(
        &self,
        catalog: &ShiftCatalog,
        today: NaiveDate,
    ) -> Result<ParsedRequest, ServiceError> {
        let filters = FilterSet {
            clients: normalize_filter(self.clients.as_ref()),
            departments: normalize_filter(self.departments.as_ref()),
            shifts: normalize_shifts(self.shifts.as_ref(), catalog)?,
            employees: normalize_filter(self.employees.as_ref()),
            partners: normalize_filter(self.partners.as_ref()),
            headcounts: parse_headcount_ranges(self.headcounts.as_ref())?,
        };
        Ok(ParsedRequest {
            filters,
            years: parse_years(self.years.as_deref(), today)?,
            months: parse_months(self.months.as_deref())?,
            sort_by: parse_sort_by(self.sort_by.as_deref())?,
            sort_order: parse_sort_order(self.sort_order.as_deref())?,
            top: parse_top(self.top.as_ref())?,
            start: self.start.unwrap_or(0) as usize,
            limit: self.limit.map(|l| l as usize),
        })
    }
}

impl ParsedRequest {
    /// True for the hot path: no constraints, no explicit periods, no
    /// reordering. Only this shape is cache-eligible.
    pub fn is_default_shape(&self) -> bool {
        !self.filters.clients.is_constrained()
            && !self.filters.departments.is_constrained()
            && !self.filters.shifts.is_constrained()
            && !self.filters.employees.is_constrained()
            && !self.filters.partners.is_constrained()
            && self.filters.headcounts.is_none()
            && self.years.is_empty()
            && self.months.is_empty()
            && self.sort_by.is_none()
            && self.sort_order == SortOrder::Default
            && self.top.is_none()
            && self.start == 0
            && self.limit.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    #[test]
    fn empty_body_parses_to_default_shape() {
        let parsed = ReportParams::default()
            .parse(&ShiftCatalog::default(), today())
            .unwrap();
        assert!(parsed.is_default_shape());
    }

    #[test]
    fn any_constraint_leaves_the_default_shape() {
        let params = ReportParams {
            clients: Some(FilterInput::One(ScalarInput::Text("Acme".into()))),
            ..ReportParams::default()
        };
        let parsed = params.parse(&ShiftCatalog::default(), today()).unwrap();
        assert!(!parsed.is_default_shape());

        let params = ReportParams {
            top: Some(ScalarInput::Int(5)),
            ..ReportParams::default()
        };
        let parsed = params.parse(&ShiftCatalog::default(), today()).unwrap();
        assert!(!parsed.is_default_shape());
    }

    #[test]
    fn invalid_sort_key_fails_before_any_query() {
        let params = ReportParams {
            sort_by: Some("alphabetical".into()),
            ..ReportParams::default()
        };
        let err = params.parse(&ShiftCatalog::default(), today()).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }
}
