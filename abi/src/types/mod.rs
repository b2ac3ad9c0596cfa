use std::str::FromStr;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, Row};

use crate::Error;

mod reservation;
mod reservation_filter;
mod reservation_status;
mod reserve_request;
mod room;

pub use reservation::*;
pub use reservation_filter::*;
pub use reservation_status::*;
pub use reserve_request::*;
pub use room::*;

/// Half-open interval overlap: `[a_start, a_end)` and `[b_start, b_end)` share
/// at least one instant.
pub fn intervals_overlap<T: PartialOrd>(a_start: &T, a_end: &T, b_start: &T, b_end: &T) -> bool {
    a_start < b_end && a_end > b_start
}

/// A stay normalized to the hotel check-in / check-out hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaySpan {
    pub check_in: DateTime<Utc>,
    pub check_out: DateTime<Utc>,
}

impl StaySpan {
    pub fn new(check_in: DateTime<Utc>, check_out: DateTime<Utc>) -> Result<Self, Error> {
        if check_in >= check_out {
            return Err(Error::InvalidTime);
        }
        Ok(Self {
            check_in,
            check_out,
        })
    }

    /// Number of nights, counted on calendar days.
    pub fn nights(&self) -> i64 {
        (self.check_out.date_naive() - self.check_in.date_naive()).num_days()
    }

    pub fn overlaps(&self, check_in: &DateTime<Utc>, check_out: &DateTime<Utc>) -> bool {
        intervals_overlap(&self.check_in, &self.check_out, check_in, check_out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StayPolicy {
    pub check_in_hour: u32,
    pub check_out_hour: u32,
}

impl Default for StayPolicy {
    fn default() -> Self {
        Self {
            check_in_hour: 13,
            check_out_hour: 12,
        }
    }
}

impl StayPolicy {
    pub fn span(&self, check_in: NaiveDate, check_out: NaiveDate) -> Result<StaySpan, Error> {
        if check_out <= check_in {
            return Err(Error::InvalidTime);
        }
        let at = |date: NaiveDate, hour: u32| {
            date.and_hms_opt(hour, 0, 0)
                .map(|dt| Utc.from_utc_datetime(&dt))
                .ok_or(Error::InvalidTime)
        };
        StaySpan::new(
            at(check_in, self.check_in_hour)?,
            at(check_out, self.check_out_hour)?,
        )
    }
}

// enums are stored as postgres enum types and selected as `::text`
pub(crate) fn get_enum<T>(row: &PgRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value: String = row.try_get(column)?;
    value.parse().map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn span_should_normalize_to_check_in_and_check_out_hours() {
        let span = StayPolicy::default()
            .span(date(2024, 6, 1), date(2024, 6, 3))
            .unwrap();
        assert_eq!(span.check_in.to_rfc3339(), "2024-06-01T13:00:00+00:00");
        assert_eq!(span.check_out.to_rfc3339(), "2024-06-03T12:00:00+00:00");
        assert_eq!(span.nights(), 2);
    }

    #[test]
    fn span_should_reject_empty_or_inverted_range() {
        let policy = StayPolicy::default();
        assert_eq!(
            policy.span(date(2024, 6, 3), date(2024, 6, 3)).unwrap_err(),
            Error::InvalidTime
        );
        assert_eq!(
            policy.span(date(2024, 6, 3), date(2024, 6, 1)).unwrap_err(),
            Error::InvalidTime
        );
    }

    #[test]
    fn adjacent_stays_should_not_overlap() {
        let policy = StayPolicy::default();
        let first = policy.span(date(2024, 6, 1), date(2024, 6, 3)).unwrap();
        let second = policy.span(date(2024, 6, 3), date(2024, 6, 5)).unwrap();
        assert!(!first.overlaps(&second.check_in, &second.check_out));
        assert!(!second.overlaps(&first.check_in, &first.check_out));
    }

    #[test]
    fn intersecting_stays_should_overlap() {
        let policy = StayPolicy::default();
        let first = policy.span(date(2024, 6, 1), date(2024, 6, 3)).unwrap();
        let second = policy.span(date(2024, 6, 2), date(2024, 6, 4)).unwrap();
        let inner = policy.span(date(2024, 5, 1), date(2024, 7, 1)).unwrap();
        assert!(first.overlaps(&second.check_in, &second.check_out));
        assert!(first.overlaps(&inner.check_in, &inner.check_out));
    }

    proptest! {
        #[test]
        fn overlap_should_be_symmetric(a in 0i64..100, la in 1i64..20, b in 0i64..100, lb in 1i64..20) {
            prop_assert_eq!(
                intervals_overlap(&a, &(a + la), &b, &(b + lb)),
                intervals_overlap(&b, &(b + lb), &a, &(a + la))
            );
        }

        #[test]
        fn overlap_should_match_shared_points(a in 0i64..50, la in 1i64..10, b in 0i64..50, lb in 1i64..10) {
            let shared = (a..a + la).any(|x| (b..b + lb).contains(&x));
            prop_assert_eq!(intervals_overlap(&a, &(a + la), &b, &(b + lb)), shared);
        }
    }
}
