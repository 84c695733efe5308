//! Turns a partially-specified `{years, months}` selection into a concrete,
//! ordered list of reporting periods, consulting the row source when the
//! caller gave nothing explicit.

use chrono::NaiveDate;

use crate::domain::filters::FilterSet;
use crate::domain::models::Period;
use crate::infrastructure::source::RowSource;

use super::errors::ServiceError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPeriods {
    /// Ascending, deduplicated.
    pub periods: Vec<Period>,
    /// Advisory messages for the caller (assumed year, dropped future
    /// months, fallback period used). Never errors.
    pub messages: Vec<String>,
}

pub struct PeriodResolver<'a> {
    rows: &'a dyn RowSource,
    today: NaiveDate,
}

impl<'a> PeriodResolver<'a> {
    pub fn new(rows: &'a dyn RowSource, today: NaiveDate) -> Self {
        Self { rows, today }
    }

    /// Resolution priority:
    /// 1. years and months -> cartesian product (never zip-pairing);
    /// 2. years only -> all months per year, capped at the current month
    ///    for the current year;
    /// 3. months only -> current year assumed, future months dropped with a
    ///    message;
    /// 4. neither -> current month if it has data, else the latest period
    ///    with data in the trailing 12 months, else the latest period
    ///    anywhere, else the current month (empty result downstream).
    ///
    /// An explicit selection that leaves nothing valid is a validation
    /// error, never a silent fallback.
    pub async fn resolve(
        &self,
        years: &[i32],
        months: &[u32],
        filters: &FilterSet,
    ) -> Result<ResolvedPeriods, ServiceError> {
        if years.is_empty() && months.is_empty() {
            return self.resolve_default(filters).await;
        }

        let current = Period::from_date(self.today);
        let mut messages = Vec::new();
        let mut periods: Vec<Period> = Vec::new();
        let mut excluded: Vec<String> = Vec::new();

        if !years.is_empty() && !months.is_empty() {
            for &year in years {
                for &month in months {
                    let candidate = Period::new(year, month);
                    if candidate.is_after(current) {
                        excluded.push(candidate.to_string());
                    } else {
                        periods.push(candidate);
                    }
                }
            }
        } else if !years.is_empty() {
            for &year in years {
                let upper = if year == current.year {
                    current.month
                } else {
                    12
                };
                for month in 1..=upper {
                    periods.push(Period::new(year, month));
                }
            }
        } else {
            messages.push(format!(
                "Months provided without years; assumed current year {}.",
                current.year
            ));
            for &month in months {
                let candidate = Period::new(current.year, month);
                if candidate.is_after(current) {
                    excluded.push(candidate.to_string());
                } else {
                    periods.push(candidate);
                }
            }
        }

        if !excluded.is_empty() {
            excluded.sort();
            excluded.dedup();
            messages.push(format!("Excluded future period(s): {}.", excluded.join(", ")));
        }

        if periods.is_empty() {
            return Err(ServiceError::Validation(format!(
                "All requested periods are in the future: {}",
                excluded.join(", ")
            )));
        }

        periods.sort_unstable();
        periods.dedup();
        Ok(ResolvedPeriods { periods, messages })
    }

    async fn resolve_default(&self, filters: &FilterSet) -> Result<ResolvedPeriods, ServiceError> {
        let current = Period::from_date(self.today);

        if self.rows.period_has_data(current, filters).await? {
            return Ok(ResolvedPeriods {
                periods: vec![current],
                messages: Vec::new(),
            });
        }

        let mut candidate = current;
        for _ in 0..12 {
            candidate = candidate.previous();
            if self.rows.period_has_data(candidate, filters).await? {
                return Ok(ResolvedPeriods {
                    periods: vec![candidate],
                    messages: vec![format!(
                        "No data for current month {current}; fell back to {candidate}."
                    )],
                });
            }
        }

        if let Some(latest) = self.rows.latest_period(filters).await? {
            return Ok(ResolvedPeriods {
                periods: vec![latest],
                messages: vec![format!(
                    "No data in the last 12 months; showing latest available period {latest}."
                )],
            });
        }

        // Nothing anywhere under these filters. Aggregating the current
        // month yields an explicit empty result downstream.
        Ok(ResolvedPeriods {
            periods: vec![current],
            messages: Vec::new(),
        })
    }
}

/// Groups resolved periods by year for response summaries.
pub fn group_by_year(periods: &[Period]) -> Vec<(i32, Vec<u32>)> {
    let mut grouped: Vec<(i32, Vec<u32>)> = Vec::new();
    for period in periods {
        match grouped.iter_mut().find(|(year, _)| *year == period.year) {
            Some((_, months)) => {
                if !months.contains(&period.month) {
                    months.push(period.month);
                }
            }
            None => grouped.push((period.year, vec![period.month])),
        }
    }
    for (_, months) in &mut grouped {
        months.sort_unstable();
    }
    grouped.sort_by_key(|(year, _)| *year);
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::AllowanceRow;
    use crate::infrastructure::source::MemorySource;

    fn row(period: Period) -> AllowanceRow {
        AllowanceRow {
            employee_id: Some("E1".to_string()),
            employee_name: "Asha".to_string(),
            client: "Acme".to_string(),
            department: "Data".to_string(),
            client_partner: "North".to_string(),
            period,
            shift_type: "A".to_string(),
            days: 1.0,
            rate: 100.0,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    #[tokio::test]
    async fn both_lists_expand_to_cartesian_product() {
        let source = MemorySource::new(Vec::new(), Vec::new());
        let resolver = PeriodResolver::new(&source, today());

        let resolved = resolver
            .resolve(&[2024, 2025], &[1, 2], &FilterSet::default())
            .await
            .unwrap();

        assert_eq!(
            resolved.periods,
            vec![
                Period::new(2024, 1),
                Period::new(2024, 2),
                Period::new(2025, 1),
                Period::new(2025, 2),
            ]
        );
        assert!(resolved.messages.is_empty());
    }

    #[tokio::test]
    async fn years_only_caps_current_year_at_current_month() {
        let source = MemorySource::new(Vec::new(), Vec::new());
        let resolver = PeriodResolver::new(&source, today());

        let resolved = resolver
            .resolve(&[2025], &[], &FilterSet::default())
            .await
            .unwrap();

        assert_eq!(resolved.periods.len(), 6);
        assert_eq!(*resolved.periods.last().unwrap(), Period::new(2025, 6));
    }

    #[tokio::test]
    async fn months_only_assume_current_year_and_drop_future() {
        let source = MemorySource::new(Vec::new(), Vec::new());
        let resolver = PeriodResolver::new(&source, today());

        let resolved = resolver
            .resolve(&[], &[3, 9], &FilterSet::default())
            .await
            .unwrap();

        assert_eq!(resolved.periods, vec![Period::new(2025, 3)]);
        assert!(resolved
            .messages
            .iter()
            .any(|m| m.contains("assumed current year 2025")));
        assert!(resolved
            .messages
            .iter()
            .any(|m| m.contains("Excluded future period(s): 2025-09")));
    }

    #[tokio::test]
    async fn explicit_all_future_selection_is_an_error() {
        let source = MemorySource::new(Vec::new(), Vec::new());
        let resolver = PeriodResolver::new(&source, today());

        let err = resolver
            .resolve(&[], &[11, 12], &FilterSet::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn default_request_uses_current_month_when_it_has_data() {
        let source = MemorySource::new(vec![row(Period::new(2025, 6))], Vec::new());
        let resolver = PeriodResolver::new(&source, today());

        let resolved = resolver.resolve(&[], &[], &FilterSet::default()).await.unwrap();
        assert_eq!(resolved.periods, vec![Period::new(2025, 6)]);
        assert!(resolved.messages.is_empty());
    }

    #[tokio::test]
    async fn default_request_falls_back_within_twelve_months() {
        let source = MemorySource::new(vec![row(Period::new(2025, 3))], Vec::new());
        let resolver = PeriodResolver::new(&source, today());

        let resolved = resolver.resolve(&[], &[], &FilterSet::default()).await.unwrap();
        assert_eq!(resolved.periods, vec![Period::new(2025, 3)]);
        assert_eq!(
            resolved.messages,
            vec!["No data for current month 2025-06; fell back to 2025-03.".to_string()]
        );
    }

    #[tokio::test]
    async fn default_request_falls_back_to_absolute_latest() {
        let source = MemorySource::new(vec![row(Period::new(2023, 11))], Vec::new());
        let resolver = PeriodResolver::new(&source, today());

        let resolved = resolver.resolve(&[], &[], &FilterSet::default()).await.unwrap();
        assert_eq!(resolved.periods, vec![Period::new(2023, 11)]);
        assert!(resolved.messages[0].contains("latest available period 2023-11"));
    }

    #[tokio::test]
    async fn empty_source_defaults_to_current_month() {
        let source = MemorySource::new(Vec::new(), Vec::new());
        let resolver = PeriodResolver::new(&source, today());

        let resolved = resolver.resolve(&[], &[], &FilterSet::default()).await.unwrap();
        assert_eq!(resolved.periods, vec![Period::new(2025, 6)]);
    }

    #[test]
    fn group_by_year_merges_and_sorts() {
        let grouped = group_by_year(&[
            Period::new(2025, 2),
            Period::new(2024, 12),
            Period::new(2025, 1),
        ]);
        assert_eq!(grouped, vec![(2024, vec![12]), (2025, vec![1, 2])]);
    }
}
