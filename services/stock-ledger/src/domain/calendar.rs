//! 营业日历
//!
//! “同一天”按配置的营业时区判断，而不是按 UTC 或经过的时长。

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};

/// 半开时间区间 `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// 营业日历
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessCalendar {
    offset: FixedOffset,
}

impl BusinessCalendar {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn utc() -> Self {
        Self::new(Utc.fix())
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// 与 UTC 的偏移秒数
    pub fn offset_seconds(&self) -> i32 {
        self.offset.local_minus_utc()
    }

    /// 时间点所在的营业日
    pub fn day_of(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    pub fn same_day(&self, a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
        self.day_of(a) == self.day_of(b)
    }

    /// 营业日的起止时间
    pub fn day_bounds(&self, day: NaiveDate) -> TimeRange {
        let start = self.local_midnight(day);
        TimeRange {
            start,
            end: start + Duration::days(1),
        }
    }

    /// 时间点所在营业日的起止时间
    pub fn today(&self, now: DateTime<Utc>) -> TimeRange {
        self.day_bounds(self.day_of(now))
    }

    /// 本周周一
    pub fn week_start(&self, day: NaiveDate) -> NaiveDate {
        day - Duration::days(i64::from(day.weekday().num_days_from_monday()))
    }

    pub fn month_start(&self, day: NaiveDate) -> NaiveDate {
        day.with_day(1).unwrap_or(day)
    }

    pub fn year_start(&self, day: NaiveDate) -> NaiveDate {
        day.with_ordinal(1).unwrap_or(day)
    }

    /// 当月天数
    pub fn days_in_month(&self, day: NaiveDate) -> u32 {
        let first = self.month_start(day);
        let next = if first.month() == 12 {
            NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
        };
        next.map(|n| (n - first).num_days() as u32).unwrap_or(31)
    }

    fn local_midnight(&self, day: NaiveDate) -> DateTime<Utc> {
        let naive = day.and_time(NaiveTime::MIN);
        (naive - Duration::seconds(i64::from(self.offset_seconds()))).and_utc()
    }
}
