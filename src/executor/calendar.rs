//! Calendar-relative date ranges
//!
//! All arithmetic is in UTC. Weeks start on Sunday. A fiscal year is named
//! after the calendar year it starts in.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::query::ConditionOperator;

/// Layout of fiscal periods within a fiscal year
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FiscalPeriodType {
    Annual,
    Semiannual,
    Quarterly,
    Monthly,
}

impl FiscalPeriodType {
    /// Length of one period in months
    pub fn months(&self) -> i32 {
        match self {
            FiscalPeriodType::Annual => 12,
            FiscalPeriodType::Semiannual => 6,
            FiscalPeriodType::Quarterly => 3,
            FiscalPeriodType::Monthly => 1,
        }
    }

    pub fn periods_per_year(&self) -> i32 {
        12 / self.months()
    }
}

impl Default for FiscalPeriodType {
    fn default() -> Self {
        FiscalPeriodType::Quarterly
    }
}

fn default_start_month() -> u32 {
    1
}

/// Fiscal year settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalCalendar {
    /// First month of the fiscal year, 1-12
    #[serde(default = "default_start_month")]
    pub start_month: u32,
    #[serde(default)]
    pub period: FiscalPeriodType,
}

impl Default for FiscalCalendar {
    fn default() -> Self {
        Self {
            start_month: default_start_month(),
            period: FiscalPeriodType::default(),
        }
    }
}

/// Time range; the start is inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub end_inclusive: bool,
}

impl DateRange {
    fn half_open(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            end_inclusive: false,
        }
    }

    fn closed(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            end_inclusive: true,
        }
    }

    pub fn contains(&self, dt: &DateTime<Utc>) -> bool {
        *dt >= self.start && (*dt < self.end || (self.end_inclusive && *dt == self.end))
    }
}

/// Months since year 0, for month arithmetic
fn month_index(dt: &DateTime<Utc>) -> i32 {
    dt.year() * 12 + dt.month0() as i32
}

fn month_start(index: i32) -> Option<DateTime<Utc>> {
    let date = NaiveDate::from_ymd_opt(index.div_euclid(12), index.rem_euclid(12) as u32 + 1, 1)?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

fn start_of_day(dt: &DateTime<Utc>) -> Option<DateTime<Utc>> {
    Some(dt.date_naive().and_hms_opt(0, 0, 0)?.and_utc())
}

/// Same wall-clock time `months` months away, clamped to the month's end
fn shift_months(dt: &DateTime<Utc>, months: i32) -> Option<DateTime<Utc>> {
    let target = month_start(month_index(dt).checked_add(months)?)?;
    let mut day = dt.day();
    loop {
        if let Some(date) = NaiveDate::from_ymd_opt(target.year(), target.month(), day) {
            return Some(date.and_time(dt.time()).and_utc());
        }
        day = day.checked_sub(1)?;
    }
}

impl FiscalCalendar {
    fn start_offset(&self) -> i32 {
        self.start_month.clamp(1, 12) as i32 - 1
    }

    /// Fiscal year containing `dt`
    pub fn fiscal_year_of(&self, dt: &DateTime<Utc>) -> i32 {
        (month_index(dt) - self.start_offset()).div_euclid(12)
    }

    /// 1-based fiscal period containing `dt`
    pub fn period_of(&self, dt: &DateTime<Utc>) -> i32 {
        (month_index(dt) - self.start_offset()).rem_euclid(12) / self.period.months() + 1
    }

    fn year_start_index(&self, year: i32) -> Option<i32> {
        year.checked_mul(12)?.checked_add(self.start_offset())
    }

    /// Range of fiscal year `year`
    pub fn year_range(&self, year: i32) -> Option<DateRange> {
        self.years_range(year, 1)
    }

    fn years_range(&self, first_year: i32, count: i32) -> Option<DateRange> {
        let start = self.year_start_index(first_year)?;
        let end = start.checked_add(count.checked_mul(12)?)?;
        Some(DateRange::half_open(month_start(start)?, month_start(end)?))
    }

    /// Range of 1-based period `period` of fiscal year `year`
    pub fn period_range(&self, year: i32, period: i32) -> Option<DateRange> {
        if period < 1 || period > self.period.periods_per_year() {
            return None;
        }
        self.periods_range(year, period, 1)
    }

    /// `count` consecutive periods starting at (`year`, `period`); periods
    /// outside 1..=N roll over into neighbouring years.
    fn periods_range(&self, year: i32, period: i32, count: i32) -> Option<DateRange> {
        let months = self.period.months();
        let start = self
            .year_start_index(year)?
            .checked_add(period.checked_sub(1)?.checked_mul(months)?)?;
        let end = start.checked_add(count.checked_mul(months)?)?;
        Some(DateRange::half_open(month_start(start)?, month_start(end)?))
    }

    /// Range a calendar-relative operator selects at `now`.
    ///
    /// `x` is the operator's numeric argument where it takes one. `None` for
    /// operators that are not simple ranges, and for an `x` that puts the
    /// range outside representable dates.
    pub fn relative_range(&self, op: ConditionOperator, now: DateTime<Utc>, x: Option<i64>) -> Option<DateRange> {
        use ConditionOperator::*;

        let today = start_of_day(&now)?;
        let day = Duration::days(1);
        let week_start = today - Duration::days(i64::from(now.weekday().num_days_from_sunday()));
        let this_month = month_index(&now);
        let year_start = month_index(&now) - now.month0() as i32;
        let fiscal_year = self.fiscal_year_of(&now);
        let period = self.period_of(&now);
        let x = x.and_then(|x| i32::try_from(x).ok());

        let range = match op {
            Today => DateRange::half_open(today, today + day),
            Yesterday => DateRange::half_open(today - day, today),
            Tomorrow => DateRange::half_open(today + day, today + day * 2),
            ThisWeek => DateRange::half_open(week_start, week_start + Duration::days(7)),
            LastWeek => DateRange::half_open(week_start - Duration::days(7), week_start),
            NextWeek => DateRange::half_open(week_start + Duration::days(7), week_start + Duration::days(14)),
            ThisMonth => DateRange::half_open(month_start(this_month)?, month_start(this_month + 1)?),
            LastMonth => DateRange::half_open(month_start(this_month - 1)?, month_start(this_month)?),
            NextMonth => DateRange::half_open(month_start(this_month + 1)?, month_start(this_month + 2)?),
            ThisYear => DateRange::half_open(month_start(year_start)?, month_start(year_start + 12)?),
            LastYear => DateRange::half_open(month_start(year_start - 12)?, month_start(year_start)?),
            NextYear => DateRange::half_open(month_start(year_start + 12)?, month_start(year_start + 24)?),
            LastSevenDays => DateRange::closed(today - Duration::days(7), now),
            NextSevenDays => DateRange::half_open(now, today + Duration::days(8)),
            LastXHours => DateRange::closed(now.checked_sub_signed(Duration::try_hours(i64::from(x?))?)?, now),
            NextXHours => DateRange::closed(now, now.checked_add_signed(Duration::try_hours(i64::from(x?))?)?),
            LastXDays => DateRange::closed(today.checked_sub_signed(Duration::try_days(i64::from(x?))?)?, now),
            NextXDays => {
                DateRange::half_open(now, today.checked_add_signed(Duration::try_days(i64::from(x?) + 1)?)?)
            }
            LastXWeeks => DateRange::closed(today.checked_sub_signed(Duration::try_weeks(i64::from(x?))?)?, now),
            NextXWeeks => DateRange::half_open(
                now,
                today
                    .checked_add_signed(Duration::try_weeks(i64::from(x?))?)?
                    .checked_add_signed(day)?,
            ),
            LastXMonths => DateRange::closed(shift_months(&today, x?.checked_neg()?)?, now),
            NextXMonths => DateRange::half_open(now, shift_months(&today, x?)?.checked_add_signed(day)?),
            LastXYears => DateRange::closed(shift_months(&today, x?.checked_mul(-12)?)?, now),
            NextXYears => {
                DateRange::half_open(now, shift_months(&today, x?.checked_mul(12)?)?.checked_add_signed(day)?)
            }
            ThisFiscalPeriod => self.periods_range(fiscal_year, period, 1)?,
            LastFiscalPeriod => self.periods_range(fiscal_year, period - 1, 1)?,
            NextFiscalPeriod => self.periods_range(fiscal_year, period + 1, 1)?,
            ThisFiscalYear => self.years_range(fiscal_year, 1)?,
            LastFiscalYear => self.years_range(fiscal_year - 1, 1)?,
            NextFiscalYear => self.years_range(fiscal_year + 1, 1)?,
            LastXFiscalPeriods => self.periods_range(fiscal_year, period.checked_sub(x?)?, x?)?,
            NextXFiscalPeriods => self.periods_range(fiscal_year, period + 1, x?)?,
            LastXFiscalYears => self.years_range(fiscal_year.checked_sub(x?)?, x?)?,
            NextXFiscalYears => self.years_range(fiscal_year + 1, x?)?,
            _ => return None,
        };
        Some(range)
    }

    /// Cut-off for `olderthan-x-months`: values strictly before it match
    pub fn older_than_months(&self, now: DateTime<Utc>, months: i64) -> Option<DateTime<Utc>> {
        shift_months(&now, i32::try_from(months).ok()?.checked_neg()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_week_starts_sunday() {
        // 2024-05-15 is a Wednesday
        let now = at("2024-05-15T12:00:00Z");
        let range = FiscalCalendar::default()
            .relative_range(ConditionOperator::ThisWeek, now, None)
            .unwrap();
        assert_eq!(range.start, at("2024-05-12T00:00:00Z"));
        assert_eq!(range.end, at("2024-05-19T00:00:00Z"));
    }

    #[test]
    fn test_month_ranges_cross_years() {
        let now = at("2024-01-10T08:00:00Z");
        let calendar = FiscalCalendar::default();
        let last = calendar.relative_range(ConditionOperator::LastMonth, now, None).unwrap();
        assert_eq!(last.start, at("2023-12-01T00:00:00Z"));
        assert_eq!(last.end, at("2024-01-01T00:00:00Z"));
        assert!(!last.contains(&at("2024-01-01T00:00:00Z")));
    }

    #[test]
    fn test_last_x_days_includes_now() {
        let now = at("2024-05-15T12:00:00Z");
        let range = FiscalCalendar::default()
            .relative_range(ConditionOperator::LastXDays, now, Some(3))
            .unwrap();
        assert!(range.contains(&at("2024-05-12T00:00:00Z")));
        assert!(range.contains(&now));
        assert!(!range.contains(&at("2024-05-11T23:59:59Z")));
        assert!(FiscalCalendar::default()
            .relative_range(ConditionOperator::LastXDays, now, None)
            .is_none());
    }

    #[test]
    fn test_fiscal_year_named_by_start() {
        let calendar = FiscalCalendar {
            start_month: 4,
            period: FiscalPeriodType::Quarterly,
        };
        let feb = at("2024-02-10T00:00:00Z");
        assert_eq!(calendar.fiscal_year_of(&feb), 2023);
        assert_eq!(calendar.period_of(&feb), 4);

        let range = calendar.year_range(2023).unwrap();
        assert_eq!(range.start, at("2023-04-01T00:00:00Z"));
        assert_eq!(range.end, at("2024-04-01T00:00:00Z"));
    }

    #[test]
    fn test_fiscal_periods_roll_over() {
        let calendar = FiscalCalendar::default();
        let now = at("2024-02-10T00:00:00Z");

        let last = calendar.relative_range(ConditionOperator::LastFiscalPeriod, now, None).unwrap();
        assert_eq!(last.start, at("2023-10-01T00:00:00Z"));
        assert_eq!(last.end, at("2024-01-01T00:00:00Z"));

        let last_two = calendar
            .relative_range(ConditionOperator::LastXFiscalPeriods, now, Some(2))
            .unwrap();
        assert_eq!(last_two.start, at("2023-07-01T00:00:00Z"));
        assert_eq!(last_two.end, at("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn test_period_range_bounds() {
        let calendar = FiscalCalendar {
            start_month: 1,
            period: FiscalPeriodType::Monthly,
        };
        assert!(calendar.period_range(2024, 13).is_none());
        assert_eq!(calendar.period_range(2024, 2).unwrap().start, at("2024-02-01T00:00:00Z"));
    }

    #[test]
    fn test_shift_months_clamps_day() {
        let dt = at("2024-03-31T10:00:00Z");
        assert_eq!(shift_months(&dt, -1), Some(at("2024-02-29T10:00:00Z")));
    }

    #[test]
    fn test_huge_arguments_yield_no_range() {
        use ConditionOperator::*;

        let now = at("2024-05-15T12:00:00Z");
        let calendar = FiscalCalendar::default();
        let operators = [
            LastXDays,
            NextXDays,
            LastXWeeks,
            NextXWeeks,
            LastXMonths,
            NextXMonths,
            LastXYears,
            NextXYears,
            LastXFiscalPeriods,
            NextXFiscalPeriods,
            LastXFiscalYears,
            NextXFiscalYears,
        ];

        for op in operators {
            for x in [1_000_000_000, i64::from(i32::MAX), i64::from(i32::MIN), i64::MAX] {
                let range = calendar.relative_range(op, now, Some(x));
                assert!(range.is_none(), "{:?} with {} gave {:?}", op, x, range);
            }
        }
        // About 245,000 years either way, still representable
        for x in [i64::from(i32::MAX), i64::from(i32::MIN)] {
            assert!(calendar.relative_range(LastXHours, now, Some(x)).is_some());
            assert!(calendar.relative_range(NextXHours, now, Some(x)).is_some());
        }
        assert!(calendar.older_than_months(now, i64::from(i32::MIN)).is_none());
        assert!(calendar.older_than_months(now, 1_000_000_000).is_none());
    }

    #[test]
    fn test_huge_fiscal_years_yield_no_range() {
        let calendar = FiscalCalendar::default();
        assert!(calendar.year_range(i32::MAX).is_none());
        assert!(calendar.year_range(i32::MIN).is_none());
        assert!(calendar.period_range(i32::MAX, 1).is_none());
    }
}
