//! Deterministic ordering and top-N truncation of client nodes.

use std::cmp::Ordering;

use crate::domain::filters::{SortBy, SortOrder};

use super::aggregation::ClientNode;

/// Reorders clients in place. `SortOrder::Default` leaves the aggregation's
/// first-seen order untouched; it is not an alias for ascending. Numeric
/// keys tie-break on the client name so equal values still order
/// deterministically.
pub fn sort_clients(clients: &mut [ClientNode], sort_by: Option<SortBy>, order: SortOrder) {
    let Some(sort_by) = sort_by else { return };
    if order == SortOrder::Default {
        return;
    }

    clients.sort_by(|a, b| {
        let cmp = match sort_by {
            SortBy::Client => name_key(&a.name).cmp(&name_key(&b.name)),
            SortBy::ClientPartner => name_key(&a.client_partner)
                .cmp(&name_key(&b.client_partner))
                .then_with(|| name_key(&a.name).cmp(&name_key(&b.name))),
            SortBy::Departments => numeric(a.department_count() as f64, b.department_count() as f64, a, b),
            SortBy::Headcount => numeric(a.headcount() as f64, b.headcount() as f64, a, b),
            SortBy::TotalAllowance => numeric(a.total_allowance, b.total_allowance, a, b),
        };
        match order {
            SortOrder::Asc | SortOrder::Default => cmp,
            SortOrder::Desc => cmp.reverse(),
        }
    });
}

fn numeric(a_key: f64, b_key: f64, a: &ClientNode, b: &ClientNode) -> Ordering {
    a_key
        .total_cmp(&b_key)
        .then_with(|| name_key(&a.name).cmp(&name_key(&b.name)))
}

fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Keeps the first `top` entries; `None` means no limit.
pub fn truncate<T>(items: &mut Vec<T>, top: Option<usize>) {
    if let Some(top) = top {
        items.truncate(top);
    }
}
