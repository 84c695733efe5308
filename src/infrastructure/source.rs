//! Data-source boundary for the aggregation core.
//!
//! The core never sees SQL: it consumes the [`RowSource`] and [`RateSource`]
//! capabilities. Production wires the Postgres implementations below;
//! tests use [`MemorySource`].

use async_trait::async_trait;
use sqlx::{postgres::PgRow, Row};
use thiserror::Error;

use crate::domain::filters::{clean_str, FilterSet, FilterValue};
use crate::domain::models::{AllowanceRow, Period, RateEntry, RateTable};

use super::db::PgPool;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("row source failure: {0}")]
    Query(String),
}

/// Provider of raw shift-allowance rows for a resolved set of periods and a
/// canonical filter set. One pass over the result is sufficient and
/// expected.
#[async_trait]
pub trait RowSource: Send + Sync {
    async fn fetch_rows(
        &self,
        periods: &[Period],
        filters: &FilterSet,
    ) -> Result<Vec<AllowanceRow>, SourceError>;

    /// Whether any row exists for the period under the given filters.
    async fn period_has_data(
        &self,
        period: Period,
        filters: &FilterSet,
    ) -> Result<bool, SourceError>;

    /// The most recent period with any data under the given filters.
    async fn latest_period(&self, filters: &FilterSet) -> Result<Option<Period>, SourceError>;

    async fn distinct_clients(&self) -> Result<Vec<String>, SourceError>;
}

/// Provider of the rate table, consulted once per request.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn rate_table(&self) -> Result<RateTable, SourceError>;
}

struct FilterBinds {
    clients: Vec<String>,
    departments: Vec<String>,
    employee_patterns: Vec<String>,
    partner_patterns: Vec<String>,
    shifts: Vec<String>,
}

fn filter_binds(filters: &FilterSet) -> FilterBinds {
    let exact_lower = |value: &FilterValue| -> Vec<String> {
        value
            .values()
            .map(|vals| vals.iter().map(|v| v.trim().to_lowercase()).collect())
            .unwrap_or_default()
    };
    let like_upper = |value: &FilterValue| -> Vec<String> {
        value
            .values()
            .map(|vals| {
                vals.iter()
                    .map(|v| format!("%{}%", v.trim().to_uppercase()))
                    .collect()
            })
            .unwrap_or_default()
    };

    FilterBinds {
        clients: exact_lower(&filters.clients),
        departments: exact_lower(&filters.departments),
        employee_patterns: like_upper(&filters.employees),
        partner_patterns: like_upper(&filters.partners),
        shifts: filters
            .shifts
            .values()
            .map(|vals| vals.to_vec())
            .unwrap_or_default(),
    }
}

const ROW_FILTER_SQL: &str = "\
      (cardinality($3::text[]) = 0 OR lower(trim(sa.client)) = ANY($3)) \
  AND (cardinality($4::text[]) = 0 OR lower(trim(sa.department)) = ANY($4)) \
  AND (cardinality($5::text[]) = 0 OR upper(sa.emp_id) LIKE ANY($5)) \
  AND (cardinality($6::text[]) = 0 OR upper(sa.client_partner) LIKE ANY($6))";

/// Row source backed by the `shift_allowances` / `shift_mapping` /
/// `shifts_amount` tables.
pub struct PgRowSource {
    pool: PgPool,
}

impl PgRowSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RowSource for PgRowSource {
    async fn fetch_rows(
        &self,
        periods: &[Period],
        filters: &FilterSet,
    ) -> Result<Vec<AllowanceRow>, SourceError> {
        let years: Vec<i32> = periods.iter().map(|p| p.year).collect();
        let months: Vec<i32> = periods.iter().map(|p| p.month as i32).collect();
        let binds = filter_binds(filters);

        let sql = format!(
            "SELECT sa.emp_id, sa.emp_name, sa.client, sa.department, sa.client_partner, \
                    extract(year from sa.duration_month)::int4 AS duration_year, \
                    extract(month from sa.duration_month)::int4 AS duration_mon, \
                    sm.shift_type, sm.days::float8 AS days, \
                    coalesce(r.amount, 0)::float8 AS rate \
             FROM shift_allowances sa \
             JOIN shift_mapping sm ON sm.shiftallowance_id = sa.id \
             LEFT JOIN shifts_amount r \
               ON upper(trim(r.shift_type)) = upper(trim(sm.shift_type)) \
              AND r.payroll_year::int4 = extract(year from sa.duration_month)::int4 \
             WHERE (extract(year from sa.duration_month)::int4, \
                    extract(month from sa.duration_month)::int4) \
                   IN (SELECT * FROM unnest($1::int4[], $2::int4[])) \
               AND {ROW_FILTER_SQL} \
               AND (cardinality($7::text[]) = 0 OR upper(trim(sm.shift_type)) = ANY($7)) \
             ORDER BY sa.duration_month ASC, sa.emp_id ASC"
        );

        sqlx::query(&sql)
            .bind(&years)
            .bind(&months)
            .bind(&binds.clients)
            .bind(&binds.departments)
            .bind(&binds.employee_patterns)
            .bind(&binds.partner_patterns)
            .bind(&binds.shifts)
            .map(map_allowance_row)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .into_iter()
            .collect()
    }

    async fn period_has_data(
        &self,
        period: Period,
        filters: &FilterSet,
    ) -> Result<bool, SourceError> {
        let binds = filter_binds(filters);
        // The shift predicate must participate here too, or the period
        // fallback lands on months whose rows the shift filter then drops.
        let sql = format!(
            "SELECT EXISTS ( \
                 SELECT 1 FROM shift_allowances sa \
                 JOIN shift_mapping sm ON sm.shiftallowance_id = sa.id \
                 WHERE extract(year from sa.duration_month)::int4 = $1 \
                   AND extract(month from sa.duration_month)::int4 = $2 \
                   AND {ROW_FILTER_SQL} \
                   AND (cardinality($7::text[]) = 0 OR upper(trim(sm.shift_type)) = ANY($7)) \
             )"
        );

        sqlx::query_scalar::<_, bool>(&sql)
            .bind(period.year)
            .bind(period.month as i32)
            .bind(&binds.clients)
            .bind(&binds.departments)
            .bind(&binds.employee_patterns)
            .bind(&binds.partner_patterns)
            .bind(&binds.shifts)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn latest_period(&self, filters: &FilterSet) -> Result<Option<Period>, SourceError> {
        let binds = filter_binds(filters);
        // Dummy period binds keep the shared filter fragment's placeholders
        // aligned ($1/$2 are unused here).
        let sql = format!(
            "SELECT extract(year from max(sa.duration_month))::int4 AS duration_year, \
                    extract(month from max(sa.duration_month))::int4 AS duration_mon \
             FROM shift_allowances sa \
             JOIN shift_mapping sm ON sm.shiftallowance_id = sa.id \
             WHERE $1::int4 IS NOT NULL AND $2::int4 IS NOT NULL \
               AND {ROW_FILTER_SQL} \
               AND (cardinality($7::text[]) = 0 OR upper(trim(sm.shift_type)) = ANY($7))"
        );

        let row = sqlx::query(&sql)
            .bind(0_i32)
            .bind(0_i32)
            .bind(&binds.clients)
            .bind(&binds.departments)
            .bind(&binds.employee_patterns)
            .bind(&binds.partner_patterns)
            .bind(&binds.shifts)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let year: Option<i32> = row.try_get("duration_year").map_err(map_sqlx_error)?;
        let month: Option<i32> = row.try_get("duration_mon").map_err(map_sqlx_error)?;
        match (year, month) {
            (Some(year), Some(month)) => Ok(Some(Period::new(year, month as u32))),
            _ => Ok(None),
        }
    }

    async fn distinct_clients(&self) -> Result<Vec<String>, SourceError> {
        sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT client FROM shift_allowances \
             WHERE client IS NOT NULL AND trim(client) <> '' \
             ORDER BY client ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }
}

/// Rate source backed by the `shifts_amount` table.
pub struct PgRateSource {
    pool: PgPool,
}

impl PgRateSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RateSource for PgRateSource {
    async fn rate_table(&self) -> Result<RateTable, SourceError> {
        let entries = sqlx::query(
            "SELECT shift_type, payroll_year::int4 AS payroll_year, amount::float8 AS amount \
             FROM shifts_amount",
        )
        .map(|row: PgRow| -> Result<RateEntry, SourceError> {
            Ok(RateEntry {
                shift_type: row.try_get("shift_type").map_err(map_sqlx_error)?,
                payroll_year: row.try_get("payroll_year").map_err(map_sqlx_error)?,
                amount: row.try_get("amount").map_err(map_sqlx_error)?,
            })
        })
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

        Ok(RateTable::from_entries(entries))
    }
}

fn map_allowance_row(row: PgRow) -> Result<AllowanceRow, SourceError> {
    let year: i32 = row.try_get("duration_year").map_err(map_sqlx_error)?;
    let month: i32 = row.try_get("duration_mon").map_err(map_sqlx_error)?;
    Ok(AllowanceRow {
        employee_id: row
            .try_get::<Option<String>, _>("emp_id")
            .map_err(map_sqlx_error)?,
        employee_name: row
            .try_get::<Option<String>, _>("emp_name")
            .map_err(map_sqlx_error)?
            .unwrap_or_default(),
        client: row
            .try_get::<Option<String>, _>("client")
            .map_err(map_sqlx_error)?
            .unwrap_or_default(),
        department: row
            .try_get::<Option<String>, _>("department")
            .map_err(map_sqlx_error)?
            .unwrap_or_default(),
        client_partner: row
            .try_get::<Option<String>, _>("client_partner")
            .map_err(map_sqlx_error)?
            .unwrap_or_default(),
        period: Period::new(year, month as u32),
        shift_type: row.try_get("shift_type").map_err(map_sqlx_error)?,
        days: row.try_get("days").map_err(map_sqlx_error)?,
        rate: row.try_get("rate").map_err(map_sqlx_error)?,
    })
}

fn map_sqlx_error(err: sqlx::Error) -> SourceError {
    SourceError::Query(err.to_string())
}

/// In-memory row and rate source mirroring the Postgres filter semantics.
/// Used by the test suite; also handy for local experimentation.
#[derive(Default)]
pub struct MemorySource {
    rows: Vec<AllowanceRow>,
    rates: Vec<RateEntry>,
    fetch_calls: std::sync::atomic::AtomicUsize,
}

impl MemorySource {
    pub fn new(rows: Vec<AllowanceRow>, rates: Vec<RateEntry>) -> Self {
        Self {
            rows,
            rates,
            fetch_calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Number of `fetch_rows` calls served so far.
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn row_matches(row: &AllowanceRow, filters: &FilterSet) -> bool {
        let substring_match = |value: &FilterValue, candidate: &str| -> bool {
            match value.values() {
                None => true,
                Some(vals) => {
                    let upper = candidate.to_uppercase();
                    vals.iter().any(|v| upper.contains(&v.to_uppercase()))
                }
            }
        };
        let shift_matches = match filters.shifts.values() {
            None => true,
            Some(vals) => {
                let key = clean_str(&row.shift_type).to_uppercase();
                vals.iter().any(|v| *v == key)
            }
        };

        shift_matches
            && filters.clients.matches(&row.client)
            && filters.departments.matches(&row.department)
            && substring_match(
                &filters.employees,
                row.employee_id.as_deref().unwrap_or(""),
            )
            && substring_match(&filters.partners, &row.client_partner)
    }
}

#[async_trait]
impl RowSource for MemorySource {
    async fn fetch_rows(
        &self,
        periods: &[Period],
        filters: &FilterSet,
    ) -> Result<Vec<AllowanceRow>, SourceError> {
        self.fetch_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(self
            .rows
            .iter()
            .filter(|row| periods.contains(&row.period) && Self::row_matches(row, filters))
            .cloned()
            .collect())
    }

    async fn period_has_data(
        &self,
        period: Period,
        filters: &FilterSet,
    ) -> Result<bool, SourceError> {
        Ok(self
            .rows
            .iter()
            .any(|row| row.period == period && Self::row_matches(row, filters)))
    }

    async fn latest_period(&self, filters: &FilterSet) -> Result<Option<Period>, SourceError> {
        Ok(self
            .rows
            .iter()
            .filter(|row| Self::row_matches(row, filters))
            .map(|row| row.period)
            .max())
    }

    async fn distinct_clients(&self) -> Result<Vec<String>, SourceError> {
        let mut clients: Vec<String> = self
            .rows
            .iter()
            .map(|row| row.client.clone())
            .filter(|c| !c.trim().is_empty())
            .collect();
        clients.sort();
        clients.dedup();
        Ok(clients)
    }
}

#[async_trait]
impl RateSource for MemorySource {
    async fn rate_table(&self) -> Result<RateTable, SourceError> {
        Ok(RateTable::from_entries(self.rates.clone()))
    }
}
