//! Headcount-range filtering over the finished aggregate.
//!
//! Headcount is emergent (unique employees per group), so this must run
//! after aggregation; pushing the ranges into the row query would filter
//! the wrong thing.

use crate::domain::filters::{FilterSet, HeadcountRange};

use super::aggregation::Aggregate;

/// Which grouping the ranges apply to. Department when the caller
/// explicitly constrained departments, client otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadcountScope {
    Client,
    Department,
}

impl HeadcountScope {
    pub fn from_filters(filters: &FilterSet) -> Self {
        if filters.departments.is_constrained() {
            HeadcountScope::Department
        } else {
            HeadcountScope::Client
        }
    }
}

fn in_any_range(ranges: &[HeadcountRange], count: usize) -> bool {
    ranges.iter().any(|r| r.contains(count))
}

/// Drops groups whose unique-employee count falls outside every requested
/// range. At department scope, client roll-ups are rebuilt from the
/// surviving departments and clients left with none are dropped too. The
/// partner view is untouched (it reflects the pre-cut population).
pub fn apply(agg: &mut Aggregate, scope: HeadcountScope, ranges: Option<&[HeadcountRange]>) {
    let Some(ranges) = ranges else { return };
    if ranges.is_empty() {
        return;
    }

    match scope {
        HeadcountScope::Client => {
            agg.clients.retain(|c| in_any_range(ranges, c.headcount()));
        }
        HeadcountScope::Department => {
            for client in &mut agg.clients {
                client
                    .departments
                    .retain(|d| in_any_range(ranges, d.headcount()));
                client.recompute_from_departments();
            }
            agg.clients.retain(|c| !c.departments.is_empty());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::filters::{FilterValue, HeadcountRange};
    use crate::domain::models::{AllowanceRow, Period, ShiftCatalog, ShiftKeyDef};
    use crate::services::aggregation::aggregate;

    fn row(id: &str, client: &str, dept: &str) -> AllowanceRow {
        AllowanceRow {
            employee_id: Some(id.to_string()),
            employee_name: format!("Emp {id}"),
            client: client.to_string(),
            department: dept.to_string(),
            client_partner: "North".to_string(),
            period: Period::new(2025, 6),
            shift_type: "A".to_string(),
            days: 1.0,
            rate: 100.0,
        }
    }

    fn catalog() -> ShiftCatalog {
        ShiftCatalog::new(vec![ShiftKeyDef {
            key: "A".into(),
            label: "Shift A".into(),
        }])
    }

    fn build() -> Aggregate {
        aggregate(
            &[
                row("E1", "Acme", "Data"),
                row("E2", "Acme", "Data"),
                row("E3", "Acme", "Ops"),
                row("E4", "Globex", "Data"),
            ],
            &catalog(),
            &FilterValue::NoConstraint,
        )
    }

    #[test]
    fn client_scope_drops_clients_outside_every_range() {
        let mut agg = build();
        apply(
            &mut agg,
            HeadcountScope::Client,
            Some(&[HeadcountRange { min: 2, max: 10 }]),
        );
        let names: Vec<&str> = agg.clients.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Acme"]);
    }

    #[test]
    fn ranges_combine_with_or() {
        let mut agg = build();
        apply(
            &mut agg,
            HeadcountScope::Client,
            Some(&[
                HeadcountRange { min: 1, max: 1 },
                HeadcountRange { min: 3, max: 3 },
            ]),
        );
        assert_eq!(agg.clients.len(), 2);
    }

    #[test]
    fn department_scope_rebuilds_client_rollups() {
        let mut agg = build();
        apply(
            &mut agg,
            HeadcountScope::Department,
            Some(&[HeadcountRange { min: 2, max: 10 }]),
        );
        // Only Acme/Data (2 people) survives; Acme's roll-up now reflects
        // just that department, and Globex disappears entirely.
        assert_eq!(agg.clients.len(), 1);
        let acme = &agg.clients[0];
        assert_eq!(acme.departments.len(), 1);
        assert_eq!(acme.headcount(), 2);
        assert_eq!(acme.total_allowance, 200.0);
    }

    #[test]
    fn no_ranges_means_no_cut() {
        let mut agg = build();
        apply(&mut agg, HeadcountScope::Client, None);
        assert_eq!(agg.clients.len(), 2);
    }
}
