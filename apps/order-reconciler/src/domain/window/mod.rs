//! Time Windows
//!
//! Decides whether an order timestamp falls inside one of the two windows a
//! session tracks:
//!
//! - the **list window**: the day (or range) shown in the recent-activity
//!   list, defaulting to the current day;
//! - the **period window**: the reporting period, a start/end date pair
//!   derived from the selected duration.
//!
//! Calendar dates are interpreted in the workspace time zone. Windows are
//! inclusive on both ends.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Whether `timestamp` lies in `[start, end_inclusive]`.
///
/// A missing timestamp is never inside any window.
#[must_use]
pub fn in_window(
    timestamp: Option<DateTime<Utc>>,
    start: DateTime<Utc>,
    end_inclusive: DateTime<Utc>,
) -> bool {
    timestamp.is_some_and(|ts| ts >= start && ts <= end_inclusive)
}

// =============================================================================
// Date Window
// =============================================================================

/// Inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateWindow {
    from: NaiveDate,
    to: NaiveDate,
}

impl DateWindow {
    /// Create a window; reversed bounds are swapped.
    #[must_use]
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        if from <= to {
            Self { from, to }
        } else {
            Self { from: to, to: from }
        }
    }

    /// Window covering a single day.
    #[must_use]
    pub const fn single_day(day: NaiveDate) -> Self {
        Self { from: day, to: day }
    }

    /// First day of the window.
    #[must_use]
    pub const fn from(&self) -> NaiveDate {
        self.from
    }

    /// Last day of the window.
    #[must_use]
    pub const fn to(&self) -> NaiveDate {
        self.to
    }

    /// Number of calendar days covered.
    #[must_use]
    pub fn days(&self) -> u32 {
        let span = (self.to - self.from).num_days().saturating_add(1);
        u32::try_from(span).unwrap_or(u32::MAX)
    }

    /// Whether `date` is one of the window's days.
    #[must_use]
    pub fn contains_date(&self, date: NaiveDate) -> bool {
        date >= self.from && date <= self.to
    }

    /// Instant bounds of the window in `tz`: local start of the first day to
    /// the last millisecond of the last day.
    #[must_use]
    pub fn bounds(&self, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = local_day_start(self.from, tz);
        let end = self.to.succ_opt().map_or(DateTime::<Utc>::MAX_UTC, |next| {
            local_day_start(next, tz) - TimeDelta::milliseconds(1)
        });
        (start, end)
    }
}

fn local_day_start(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        // Midnight skipped by a DST jump: the day starts when the gap ends.
        .or_else(|| {
            tz.from_local_datetime(&(midnight + TimeDelta::hours(1)))
                .earliest()
        })
        .map_or_else(|| midnight.and_utc(), |local| local.with_timezone(&Utc))
}

// =============================================================================
// Selections
// =============================================================================

/// Selection for the recent-activity list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListWindow {
    /// The current day in the workspace time zone.
    #[default]
    Today,
    /// A specific day.
    Day(NaiveDate),
    /// An explicit date range.
    Range(DateWindow),
    /// No window: every order is listed, including undated ones.
    Unbounded,
}

impl ListWindow {
    /// Resolve to a concrete window given the current local date.
    #[must_use]
    pub const fn resolve(self, today: NaiveDate) -> Option<DateWindow> {
        match self {
            Self::Today => Some(DateWindow::single_day(today)),
            Self::Day(day) => Some(DateWindow::single_day(day)),
            Self::Range(window) => Some(window),
            Self::Unbounded => None,
        }
    }
}

/// Selection for the reporting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodSelection {
    /// The last `n` days, ending today.
    LastDays(u32),
    /// An explicit date range.
    Custom(DateWindow),
}

impl Default for PeriodSelection {
    fn default() -> Self {
        Self::LastDays(30)
    }
}

impl PeriodSelection {
    /// Resolve to a concrete window given the current local date.
    #[must_use]
    pub fn resolve(self, today: NaiveDate) -> DateWindow {
        match self {
            Self::LastDays(days) => {
                let back = u64::from(days.max(1) - 1);
                let from = today
                    .checked_sub_days(Days::new(back))
                    .unwrap_or(NaiveDate::MIN);
                DateWindow::new(from, today)
            }
            Self::Custom(window) => window,
        }
    }
}

// =============================================================================
// Range Filter
// =============================================================================

/// Window predicates bound to a workspace time zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeFilter {
    tz: Tz,
}

impl RangeFilter {
    /// Create a filter for `tz`.
    #[must_use]
    pub const fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Time zone used for calendar dates.
    #[must_use]
    pub const fn time_zone(&self) -> Tz {
        self.tz
    }

    /// Calendar date of `timestamp` in the workspace time zone.
    #[must_use]
    pub fn date_key(&self, timestamp: DateTime<Utc>) -> NaiveDate {
        timestamp.with_timezone(&self.tz).date_naive()
    }

    /// Today's date in the workspace time zone.
    #[must_use]
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        self.date_key(now)
    }

    /// Whether an order belongs in the list. `None` means the list has no
    /// window and accepts everything.
    #[must_use]
    pub fn in_list_window(
        &self,
        window: Option<&DateWindow>,
        timestamp: Option<DateTime<Utc>>,
    ) -> bool {
        window.is_none_or(|window| self.in_period(window, timestamp))
    }

    /// Whether an order belongs in `period`.
    ///
    /// Membership is decided on the local calendar date, so every instant of
    /// the last day counts, including sub-millisecond ones past the
    /// inclusive end that [`DateWindow::bounds`] reports.
    #[must_use]
    pub fn in_period(&self, period: &DateWindow, timestamp: Option<DateTime<Utc>>) -> bool {
        timestamp.is_some_and(|ts| period.contains_date(self.date_key(ts)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::Sao_Paulo;
    use test_case::test_case;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn utc(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn missing_timestamp_is_outside_every_window() {
        assert!(!in_window(None, DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC));
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let start = utc("2024-01-01T00:00:00Z");
        let end = utc("2024-01-01T23:59:59Z");
        assert!(in_window(Some(start), start, end));
        assert!(in_window(Some(end), start, end));
    }

    #[test]
    fn reversed_window_is_normalised() {
        let window = DateWindow::new(date(2024, 1, 5), date(2024, 1, 1));
        assert_eq!(window.from(), date(2024, 1, 1));
        assert_eq!(window.to(), date(2024, 1, 5));
        assert_eq!(window.days(), 5);
    }

    // Sao Paulo is UTC-3 in January 2024.
    #[test_case("2024-01-01T03:00:00Z", true ; "local midnight of first day")]
    #[test_case("2024-01-01T02:59:59Z", false ; "just before local start")]
    #[test_case("2024-01-03T02:59:59.999Z", true ; "last millisecond of last day")]
    #[test_case("2024-01-03T02:59:59.9995Z", true ; "sub millisecond at end of last day")]
    #[test_case("2024-01-03T03:00:00Z", false ; "local midnight after last day")]
    fn period_edges_follow_workspace_time_zone(raw: &str, expected: bool) {
        let filter = RangeFilter::new(Sao_Paulo);
        let period = DateWindow::new(date(2024, 1, 1), date(2024, 1, 2));
        assert_eq!(filter.in_period(&period, Some(utc(raw))), expected);
    }

    #[test]
    fn date_key_uses_local_calendar() {
        let filter = RangeFilter::new(Sao_Paulo);
        assert_eq!(filter.date_key(utc("2024-01-02T01:30:00Z")), date(2024, 1, 1));
        assert_eq!(filter.date_key(utc("2024-01-02T03:30:00Z")), date(2024, 1, 2));
    }

    #[test]
    fn period_membership_agrees_with_date_key() {
        let filter = RangeFilter::new(Sao_Paulo);
        let period = DateWindow::new(date(2024, 1, 1), date(2024, 1, 2));
        let last_instant = utc("2024-01-03T02:59:59.999999999Z");

        assert!(period.contains_date(filter.date_key(last_instant)));
        assert!(filter.in_period(&period, Some(last_instant)));
        assert!(filter.in_list_window(Some(&period), Some(last_instant)));
    }

    #[test]
    fn unbounded_list_accepts_undated_orders() {
        let filter = RangeFilter::new(Sao_Paulo);
        assert!(filter.in_list_window(None, None));

        let today = DateWindow::single_day(date(2024, 1, 1));
        assert!(!filter.in_list_window(Some(&today), None));
    }

    #[test]
    fn last_days_ends_today() {
        let window = PeriodSelection::LastDays(7).resolve(date(2024, 3, 10));
        assert_eq!(window.from(), date(2024, 3, 4));
        assert_eq!(window.to(), date(2024, 3, 10));
        assert_eq!(window.days(), 7);

        let degenerate = PeriodSelection::LastDays(0).resolve(date(2024, 3, 10));
        assert_eq!(degenerate, DateWindow::single_day(date(2024, 3, 10)));
    }

    #[test]
    fn list_window_defaults_to_today() {
        let today = date(2024, 3, 10);
        assert_eq!(
            ListWindow::default().resolve(today),
            Some(DateWindow::single_day(today))
        );
        assert_eq!(ListWindow::Unbounded.resolve(today), None);
    }
}
