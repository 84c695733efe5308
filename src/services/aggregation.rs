//! Single-pass aggregation of allowance rows into nested
//! client -> department -> employee buckets plus a client-partner view.
//!
//! Node order is first-seen insertion order, which is what the sorting
//! stage's `default` order preserves.

use std::collections::{HashMap, HashSet};

use crate::domain::filters::{clean_str, FilterValue};
use crate::domain::models::{AllowanceRow, ShiftCatalog};

const UNKNOWN: &str = "UNKNOWN";

/// Days and currency for one shift type within some scope.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ShiftStat {
    pub days: f64,
    pub allowance: f64,
}

impl ShiftStat {
    fn add(&mut self, days: f64, allowance: f64) {
        self.days += days;
        self.allowance += allowance;
    }
}

/// Per-shift totals in first-seen key order.
#[derive(Debug, Clone, Default)]
pub struct ShiftTotals {
    keys: Vec<String>,
    stats: HashMap<String, ShiftStat>,
}

impl ShiftTotals {
    pub(crate) fn add(&mut self, key: &str, days: f64, allowance: f64) {
        if !self.stats.contains_key(key) {
            self.keys.push(key.to_string());
        }
        self.stats.entry(key.to_string()).or_default().add(days, allowance);
    }

    pub fn get(&self, key: &str) -> ShiftStat {
        self.stats.get(key).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ShiftStat)> {
        self.keys.iter().map(|k| (k.as_str(), self.stats[k]))
    }
}

#[derive(Debug, Clone)]
pub struct EmployeeNode {
    /// Display id; empty when the row had none.
    pub employee_id: String,
    pub employee_name: String,
    pub shifts: ShiftTotals,
    pub total_days: f64,
    pub total_allowance: f64,
}

#[derive(Debug, Clone, Default)]
pub struct DepartmentNode {
    pub name: String,
    pub employees: Vec<EmployeeNode>,
    pub(crate) employee_index: HashMap<String, usize>,
    pub employee_ids: HashSet<String>,
    pub shifts: ShiftTotals,
    pub total_days: f64,
    pub total_allowance: f64,
}

impl DepartmentNode {
    pub fn headcount(&self) -> usize {
        self.employee_ids.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientNode {
    pub name: String,
    /// Partner attribution from the first row seen for this client.
    pub client_partner: String,
    pub departments: Vec<DepartmentNode>,
    pub(crate) department_index: HashMap<String, usize>,
    pub employee_ids: HashSet<String>,
    pub shifts: ShiftTotals,
    pub total_days: f64,
    pub total_allowance: f64,
}

impl ClientNode {
    pub fn headcount(&self) -> usize {
        self.employee_ids.len()
    }

    pub fn department_count(&self) -> usize {
        self.departments.len()
    }

    /// Recomputes roll-ups from the surviving departments after a
    /// department-level cut.
    pub fn recompute_from_departments(&mut self) {
        self.employee_ids.clear();
        self.shifts = ShiftTotals::default();
        self.total_days = 0.0;
        self.total_allowance = 0.0;
        for dept in &self.departments {
            self.employee_ids.extend(dept.employee_ids.iter().cloned());
            for (key, stat) in dept.shifts.iter() {
                self.shifts.add(key, stat.days, stat.allowance);
            }
            self.total_days += dept.total_days;
            self.total_allowance += dept.total_allowance;
        }
        self.department_index = self
            .departments
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name.to_lowercase(), i))
            .collect();
    }
}

#[derive(Debug, Clone, Default)]
pub struct PartnerClientNode {
    pub name: String,
    pub employee_ids: HashSet<String>,
    pub total_days: f64,
    pub total_allowance: f64,
}

#[derive(Debug, Clone, Default)]
pub struct PartnerNode {
    pub name: String,
    pub clients: Vec<PartnerClientNode>,
    pub(crate) client_index: HashMap<String, usize>,
    pub employee_ids: HashSet<String>,
    pub total_days: f64,
    pub total_allowance: f64,
}

impl PartnerNode {
    pub fn headcount(&self) -> usize {
        self.employee_ids.len()
    }
}

/// The full aggregation result: both views over the same rows, plus grand
/// totals across everything that was accepted.
#[derive(Debug, Clone, Default)]
pub struct Aggregate {
    pub clients: Vec<ClientNode>,
    pub(crate) client_index: HashMap<String, usize>,
    pub partners: Vec<PartnerNode>,
    pub(crate) partner_index: HashMap<String, usize>,
    pub shifts: ShiftTotals,
    pub employee_ids: HashSet<String>,
    pub total_days: f64,
    pub total_allowance: f64,
}

impl Aggregate {
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn headcount(&self) -> usize {
        self.employee_ids.len()
    }
}

/// Builds the nested aggregate from already-filtered rows. Rows whose shift
/// key falls outside the active set (the selected shifts if constrained,
/// else the configured catalog) are skipped entirely.
pub fn aggregate(rows: &[AllowanceRow], catalog: &ShiftCatalog, shifts: &FilterValue) -> Aggregate {
    let mut agg = Aggregate::default();

    for row in rows {
        let shift_key = clean_str(&row.shift_type).to_uppercase();
        if !shift_accepted(&shift_key, catalog, shifts) {
            continue;
        }

        let client = non_empty(&row.client);
        let department = non_empty(&row.department);
        let partner = non_empty(&row.client_partner);
        let identity = employee_identity(row);
        let days = row.days;
        let allowance = row.allowance();

        agg.shifts.add(&shift_key, days, allowance);
        agg.total_days += days;
        agg.total_allowance += allowance;
        agg.employee_ids.insert(identity.clone());

        let client_node = intern(&mut agg.clients, &mut agg.client_index, &client, || {
            ClientNode {
                name: client.clone(),
                client_partner: partner.clone(),
                ..ClientNode::default()
            }
        });
        client_node.employee_ids.insert(identity.clone());
        client_node.shifts.add(&shift_key, days, allowance);
        client_node.total_days += days;
        client_node.total_allowance += allowance;

        let dept_node = intern(
            &mut client_node.departments,
            &mut client_node.department_index,
            &department,
            || DepartmentNode {
                name: department.clone(),
                ..DepartmentNode::default()
            },
        );
        dept_node.employee_ids.insert(identity.clone());
        dept_node.shifts.add(&shift_key, days, allowance);
        dept_node.total_days += days;
        dept_node.total_allowance += allowance;

        let emp_node = intern(
            &mut dept_node.employees,
            &mut dept_node.employee_index,
            &identity,
            || EmployeeNode {
                employee_id: row.employee_id.clone().unwrap_or_default(),
                employee_name: row.employee_name.clone(),
                shifts: ShiftTotals::default(),
                total_days: 0.0,
                total_allowance: 0.0,
            },
        );
        emp_node.shifts.add(&shift_key, days, allowance);
        emp_node.total_days += days;
        emp_node.total_allowance += allowance;

        let partner_node = intern(&mut agg.partners, &mut agg.partner_index, &partner, || {
            PartnerNode {
                name: partner.clone(),
                ..PartnerNode::default()
            }
        });
        partner_node.employee_ids.insert(identity.clone());
        partner_node.total_days += days;
        partner_node.total_allowance += allowance;

        let partner_client = intern(
            &mut partner_node.clients,
            &mut partner_node.client_index,
            &client,
            || PartnerClientNode {
                name: client.clone(),
                ..PartnerClientNode::default()
            },
        );
        partner_client.employee_ids.insert(identity);
        partner_client.total_days += days;
        partner_client.total_allowance += allowance;
    }

    agg
}

/// Looks up (or first inserts) the node for `key`, case-insensitively,
/// preserving first-seen order in `items`.
fn intern<'a, T>(
    items: &'a mut Vec<T>,
    index: &mut HashMap<String, usize>,
    key: &str,
    make: impl FnOnce() -> T,
) -> &'a mut T {
    let idx = *index.entry(key.to_lowercase()).or_insert_with(|| {
        items.push(make());
        items.len() - 1
    });
    &mut items[idx]
}

fn shift_accepted(key: &str, catalog: &ShiftCatalog, shifts: &FilterValue) -> bool {
    if key.is_empty() {
        return false;
    }
    match shifts.values() {
        Some(selected) => selected.iter().any(|s| s == key),
        None => catalog.is_empty() || catalog.contains(key),
    }
}

fn non_empty(value: &str) -> String {
    let cleaned = clean_str(value);
    if cleaned.is_empty() {
        UNKNOWN.to_string()
    } else {
        cleaned
    }
}

/// Unique-employee identity for headcount purposes: the employee id when
/// present, else a degenerate name|department|client key so id-less rows
/// cannot collapse across departments.
pub fn employee_identity(row: &AllowanceRow) -> String {
    match row.employee_id.as_deref().map(clean_str) {
        Some(id) if !id.is_empty() => id.to_uppercase(),
        _ => format!(
            "{}|{}|{}",
            clean_str(&row.employee_name).to_uppercase(),
            non_empty(&row.department).to_uppercase(),
            non_empty(&row.client).to_uppercase()
        ),
    }
}

/// Rounds currency to 2 decimal places at the presentation boundary.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
