use std::collections::HashMap;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// One reporting month. Ordering is chronological (year first, then month).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn previous(self) -> Self {
        if self.month == 1 {
            Self::new(self.year - 1, 12)
        } else {
            Self::new(self.year, self.month - 1)
        }
    }

    pub fn is_after(self, other: Period) -> bool {
        (self.year, self.month) > (other.year, other.month)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// One raw shift-allowance row as yielded by a row source: one employee,
/// one reporting month, one shift type. `rate` is zero when no rate table
/// entry matches the shift type for that payroll year.
#[derive(Debug, Clone)]
pub struct AllowanceRow {
    pub employee_id: Option<String>,
    pub employee_name: String,
    pub client: String,
    pub department: String,
    pub client_partner: String,
    pub period: Period,
    pub shift_type: String,
    pub days: f64,
    pub rate: f64,
}

impl AllowanceRow {
    pub fn allowance(&self) -> f64 {
        self.days * self.rate
    }
}

/// One rate table entry: currency-per-day for a shift type in a payroll year.
#[derive(Debug, Clone)]
pub struct RateEntry {
    pub shift_type: String,
    pub payroll_year: i32,
    pub amount: f64,
}

/// In-memory `(shift type, payroll year) -> amount` lookup, built once per
/// request. Missing entries resolve to zero rather than failing.
#[derive(Debug, Clone, Default)]
pub struct RateTable {
    rates: HashMap<(String, i32), f64>,
}

impl RateTable {
    pub fn from_entries(entries: Vec<RateEntry>) -> Self {
        let mut rates = HashMap::with_capacity(entries.len());
        for entry in entries {
            rates.insert(
                (entry.shift_type.trim().to_uppercase(), entry.payroll_year),
                entry.amount,
            );
        }
        Self { rates }
    }

    pub fn amount(&self, shift_type: &str, payroll_year: i32) -> f64 {
        self.rates
            .get(&(shift_type.trim().to_uppercase(), payroll_year))
            .copied()
            .unwrap_or(0.0)
    }
}

/// A configured shift type: the key as it appears in the data plus a
/// human-readable label for rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftKeyDef {
    pub key: String,
    pub label: String,
}

/// The set of valid shift-type keys for this deployment. Loaded from
/// configuration, never hardcoded: new region codes can be added without a
/// rebuild. Keys are stored uppercase in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ShiftCatalog {
    defs: Vec<ShiftKeyDef>,
}

impl ShiftCatalog {
    pub fn new(defs: Vec<ShiftKeyDef>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let mut normalized = Vec::with_capacity(defs.len());
        for def in defs {
            let key = def.key.trim().to_uppercase();
            if key.is_empty() || !seen.insert(key.clone()) {
                continue;
            }
            normalized.push(ShiftKeyDef {
                key,
                label: def.label,
            });
        }
        Self { defs: normalized }
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.defs.iter().map(|d| d.key.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        let wanted = key.trim().to_uppercase();
        self.defs.iter().any(|d| d.key == wanted)
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        let wanted = key.trim().to_uppercase();
        self.defs
            .iter()
            .find(|d| d.key == wanted)
            .map(|d| d.label.as_str())
    }

    /// Stable digest of the configured key set. Cache entries carry this so
    /// that adding or renaming a shift type invalidates stale aggregations.
    pub fn fingerprint(&self) -> String {
        let mut keys: Vec<&str> = self.defs.iter().map(|d| d.key.as_str()).collect();
        keys.sort_unstable();
        keys.join("|")
    }
}
