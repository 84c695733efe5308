use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use thiserror::Error;

use crate::domain::models::ShiftCatalog;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct FilterError(pub String);

/// Raw filter value as it arrives on the wire: a bare string (possibly a
/// comma or pipe separated list) or an array of strings/numbers. `None` at
/// the request level means "no constraint".
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FilterInput {
    One(ScalarInput),
    Many(Vec<ScalarInput>),
}

/// Accepts both `2024` and `"2024"` inside request lists.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ScalarInput {
    Int(i64),
    Text(String),
}

impl ScalarInput {
    fn as_text(&self) -> String {
        match self {
            ScalarInput::Int(v) => v.to_string(),
            ScalarInput::Text(s) => s.clone(),
        }
    }
}

/// Canonical form of one filter family: either unconstrained, or a
/// non-empty list of cleaned values in first-seen order. An empty or
/// missing input always normalizes to `NoConstraint`, never to an empty
/// set that would accidentally mean "match nothing".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FilterValue {
    #[default]
    NoConstraint,
    Values(Vec<String>),
}

impl FilterValue {
    pub fn is_constrained(&self) -> bool {
        matches!(self, FilterValue::Values(_))
    }

    pub fn values(&self) -> Option<&[String]> {
        match self {
            FilterValue::NoConstraint => None,
            FilterValue::Values(v) => Some(v.as_slice()),
        }
    }

    /// Case-insensitive exact membership; unconstrained matches everything.
    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            FilterValue::NoConstraint => true,
            FilterValue::Values(values) => {
                let wanted = candidate.trim().to_lowercase();
                values.iter().any(|v| v.to_lowercase() == wanted)
            }
        }
    }
}

/// An inclusive headcount bucket. Lists of ranges combine with OR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadcountRange {
    pub min: u32,
    pub max: u32,
}

impl HeadcountRange {
    pub fn contains(&self, count: usize) -> bool {
        let count = count as u64;
        u64::from(self.min) <= count && count <= u64::from(self.max)
    }
}

/// Canonicalized request constraints. Built once, early, by the
/// normalization functions below; downstream stages assume it is valid and
/// never re-validate.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    pub clients: FilterValue,
    pub departments: FilterValue,
    /// Uppercased, validated against the shift catalog.
    pub shifts: FilterValue,
    /// Employee id fragments, matched case-insensitively as substrings.
    pub employees: FilterValue,
    /// Partner name fragments, matched case-insensitively as substrings.
    pub partners: FilterValue,
    pub headcounts: Option<Vec<HeadcountRange>>,
}

/// Strips surrounding quotes, zero-width and non-breaking spaces, and maps
/// the textual null markers the upload pipeline leaks (`NULL`, `NONE`,
/// `NAN`) to an empty string.
pub fn clean_str(raw: &str) -> String {
    let mut s: String = raw
        .chars()
        .filter(|c| *c != '\u{200b}' && *c != '\u{00a0}')
        .collect();
    s = s.trim().to_string();

    for _ in 0..2 {
        let bytes = s.as_bytes();
        if bytes.len() >= 2
            && (bytes[0] == b'\'' || bytes[0] == b'"')
            && bytes[0] == bytes[bytes.len() - 1]
        {
            s = s[1..s.len() - 1].trim().to_string();
        }
    }

    if matches!(s.as_str(), "'" | "''" | "\"" | "\"\"") {
        return String::new();
    }
    if matches!(s.to_uppercase().as_str(), "NULL" | "NONE" | "NAN") {
        return String::new();
    }
    s
}

/// Maps unicode dash variants (en/em dash, minus sign) to ASCII `-`.
pub fn normalize_dashes(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{2013}' | '\u{2014}' | '\u{2212}' => '-',
            other => other,
        })
        .collect()
}

fn is_all_token(s: &str) -> bool {
    s.trim().eq_ignore_ascii_case("ALL")
}

fn split_tokens(input: &FilterInput) -> Vec<String> {
    let raw: Vec<String> = match input {
        FilterInput::One(scalar) => scalar
            .as_text()
            .split(['|', ','])
            .map(str::to_string)
            .collect(),
        FilterInput::Many(items) => items.iter().map(ScalarInput::as_text).collect(),
    };
    raw.into_iter()
        .map(|t| clean_str(&t))
        .filter(|t| !t.is_empty())
        .collect()
}

/// Normalizes `None | "ALL" | ["ALL"] | "a,b" | ["a","b"]` to a
/// `FilterValue`. Idempotent: normalizing already-canonical values is a
/// no-op.
pub fn normalize_filter(input: Option<&FilterInput>) -> FilterValue {
    let Some(input) = input else {
        return FilterValue::NoConstraint;
    };
    let tokens: Vec<String> = split_tokens(input)
        .into_iter()
        .filter(|t| !is_all_token(t))
        .collect();

    // ["ALL"] and the bare string "ALL" reduce to an empty token list here.
    let mut seen = std::collections::HashSet::new();
    let values: Vec<String> = tokens
        .into_iter()
        .filter(|t| seen.insert(t.to_lowercase()))
        .collect();

    if values.is_empty() {
        FilterValue::NoConstraint
    } else {
        FilterValue::Values(values)
    }
}

/// Like [`normalize_filter`] but uppercases values and validates each key
/// against the configured catalog, naming every offending key. Validation
/// is skipped when the catalog is empty (bootstrapping).
pub fn normalize_shifts(
    input: Option<&FilterInput>,
    catalog: &ShiftCatalog,
) -> Result<FilterValue, FilterError> {
    let normalized = normalize_filter(input);
    let FilterValue::Values(values) = normalized else {
        return Ok(FilterValue::NoConstraint);
    };

    let upper: Vec<String> = values.iter().map(|v| v.to_uppercase()).collect();
    if !catalog.is_empty() {
        let invalid: Vec<&str> = upper
            .iter()
            .filter(|v| !catalog.contains(v))
            .map(String::as_str)
            .collect();
        if !invalid.is_empty() {
            return Err(FilterError(format!(
                "Invalid shift type(s): {}. Allowed: {}.",
                invalid.join(", "),
                catalog.keys().collect::<Vec<_>>().join(", ")
            )));
        }
    }
    Ok(FilterValue::Values(upper))
}

/// Parses headcount buckets: `"ALL"` clears the constraint, `"N"` means the
/// exact count, `"N-M"` an inclusive range. Open-ended `"N+"` is rejected.
pub fn parse_headcount_ranges(
    input: Option<&FilterInput>,
) -> Result<Option<Vec<HeadcountRange>>, FilterError> {
    let normalized = normalize_filter(input);
    let FilterValue::Values(values) = normalized else {
        return Ok(None);
    };

    let mut ranges = Vec::with_capacity(values.len());
    for token in &values {
        let token = normalize_dashes(token);
        let token = token.trim();
        if token.ends_with('+') {
            return Err(FilterError(format!(
                "Invalid headcount format: '{token}'. Open-ended ranges are not supported; use '1-10'."
            )));
        }
        if let Some((lo, hi)) = token.split_once('-') {
            let min = parse_positive(lo.trim(), token)?;
            let max = parse_positive(hi.trim(), token)?;
            if min > max {
                return Err(FilterError(format!(
                    "Invalid headcount range (start > end): '{token}'"
                )));
            }
            ranges.push(HeadcountRange { min, max });
        } else {
            let exact = parse_positive(token, token)?;
            ranges.push(HeadcountRange {
                min: exact,
                max: exact,
            });
        }
    }
    Ok(Some(ranges))
}

fn parse_positive(s: &str, token: &str) -> Result<u32, FilterError> {
    let value = u32::from_str(s).map_err(|_| {
        FilterError(format!(
            "Invalid headcount value: '{token}'. Use a number like '5' or a range like '1-10'."
        ))
    })?;
    if value == 0 {
        return Err(FilterError(format!(
            "Invalid headcount value: '{token}'. Bounds must be positive."
        )));
    }
    Ok(value)
}

/// Parses explicit years: 4-digit, not in the future. Zero entries are the
/// UI sentinel for "unset" and are skipped.
pub fn parse_years(input: Option<&[ScalarInput]>, today: NaiveDate) -> Result<Vec<i32>, FilterError> {
    let Some(values) = input else {
        return Ok(Vec::new());
    };
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        let s = clean_str(&value.as_text());
        if s.is_empty() || s == "0" {
            continue;
        }
        if s.len() != 4 || !s.chars().all(|c| c.is_ascii_digit()) {
            return Err(FilterError(
                "Invalid year. Year must be in YYYY format (e.g., 2024).".to_string(),
            ));
        }
        let year: i32 = s
            .parse()
            .map_err(|_| FilterError(format!("Invalid year: {s}")))?;
        if year < 2000 {
            return Err(FilterError(format!("Invalid year: {year}. Must be 2000 or later.")));
        }
        if year > today.year() {
            return Err(FilterError(format!("Future year {year} cannot be selected")));
        }
        if !out.contains(&year) {
            out.push(year);
        }
    }
    Ok(out)
}

/// Parses explicit months, requiring 1..=12. Zero entries are skipped.
pub fn parse_months(input: Option<&[ScalarInput]>) -> Result<Vec<u32>, FilterError> {
    let Some(values) = input else {
        return Ok(Vec::new());
    };
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        let s = clean_str(&value.as_text());
        if s.is_empty() || s == "0" {
            continue;
        }
        let month: u32 = s
            .parse()
            .map_err(|_| FilterError(format!("Invalid month: {s}")))?;
        if !(1..=12).contains(&month) {
            return Err(FilterError(format!(
                "Invalid month: {month}. Months must be between 1 and 12."
            )));
        }
        if !out.contains(&month) {
            out.push(month);
        }
    }
    Ok(out)
}

/// Closed set of sort keys; anything else is a validation error, never a
/// silent fallback to a default key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    Client,
    ClientPartner,
    Departments,
    Headcount,
    TotalAllowance,
}

impl SortBy {
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            SortBy::Departments | SortBy::Headcount | SortBy::TotalAllowance
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Preserve the order the aggregation produced; distinct from `Asc`.
    #[default]
    Default,
    Asc,
    Desc,
}

pub fn parse_sort_by(value: Option<&str>) -> Result<Option<SortBy>, FilterError> {
    let Some(raw) = value else { return Ok(None) };
    let cleaned = clean_str(raw).to_lowercase();
    if cleaned.is_empty() {
        return Ok(None);
    }
    match cleaned.as_str() {
        "client" => Ok(Some(SortBy::Client)),
        "client_partner" => Ok(Some(SortBy::ClientPartner)),
        "departments" => Ok(Some(SortBy::Departments)),
        "headcount" => Ok(Some(SortBy::Headcount)),
        "total_allowance" => Ok(Some(SortBy::TotalAllowance)),
        other => Err(FilterError(format!(
            "sort_by must be one of client, client_partner, departments, headcount, total_allowance (got '{other}')"
        ))),
    }
}

pub fn parse_sort_order(value: Option<&str>) -> Result<SortOrder, FilterError> {
    let Some(raw) = value else {
        return Ok(SortOrder::Default);
    };
    let cleaned = clean_str(raw).to_lowercase();
    if cleaned.is_empty() {
        return Ok(SortOrder::Default);
    }
    match cleaned.as_str() {
        "default" => Ok(SortOrder::Default),
        "asc" => Ok(SortOrder::Asc),
        "desc" => Ok(SortOrder::Desc),
        other => Err(FilterError(format!(
            "sort_order must be 'default', 'asc', or 'desc' (got '{other}')"
        ))),
    }
}

/// `top`: `"ALL"`/absent lifts the limit; otherwise a positive integer.
pub fn parse_top(value: Option<&ScalarInput>) -> Result<Option<usize>, FilterError> {
    let Some(value) = value else { return Ok(None) };
    let s = clean_str(&value.as_text());
    if s.is_empty() || is_all_token(&s) {
        return Ok(None);
    }
    let top: i64 = s
        .parse()
        .map_err(|_| FilterError("top must be 'ALL' or a positive integer".to_string()))?;
    if top <= 0 {
        return Err(FilterError("top must be greater than 0".to_string()));
    }
    Ok(Some(top as usize))
}
