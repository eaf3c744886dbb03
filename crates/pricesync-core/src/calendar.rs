//! Calendar-day bucketing under an explicit UTC-offset policy.
//!
//! "Same day" decisions (ledger idempotency, daily averaging in the trend
//! engine) all go through [`DayPolicy`] so the boundary is a parameter, not
//! an accident of the host timezone.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};

/// Defines where calendar days begin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayPolicy {
    offset: FixedOffset,
}

impl Default for DayPolicy {
    fn default() -> Self {
        Self::utc()
    }
}

impl DayPolicy {
    /// Days begin at 00:00 UTC.
    #[must_use]
    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }

    /// Days begin at local midnight for the given offset east of UTC.
    ///
    /// Returns `None` when the offset is out of range (more than ±24h).
    #[must_use]
    pub fn with_offset_minutes(minutes: i32) -> Option<Self> {
        let offset = FixedOffset::east_opt(minutes.checked_mul(60)?)?;
        Some(Self { offset })
    }

    #[must_use]
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// The calendar day containing `instant`.
    #[must_use]
    pub fn day_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    /// Half-open UTC bounds `[start, end)` of the day containing `instant`.
    #[must_use]
    pub fn day_bounds(&self, instant: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let day = self.day_of(instant);
        let local_midnight = day.and_time(NaiveTime::MIN);
        // A fixed offset has no DST gaps, so the mapping is always single.
        let start = self
            .offset
            .from_local_datetime(&local_midnight)
            .single()
            .map_or(instant, |dt| dt.with_timezone(&Utc));
        (start, start + Duration::days(1))
    }

    #[must_use]
    pub fn same_day(&self, a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
        self.day_of(a) == self.day_of(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn utc_policy_splits_at_midnight_utc() {
        let policy = DayPolicy::utc();
        assert!(policy.same_day(at("2026-03-01T00:00:00Z"), at("2026-03-01T23:59:59Z")));
        assert!(!policy.same_day(at("2026-03-01T23:59:59Z"), at("2026-03-02T00:00:00Z")));
    }

    #[test]
    fn offset_policy_moves_the_boundary() {
        // UTC-5: 03:00Z on the 2nd is still the 1st locally.
        let policy = DayPolicy::with_offset_minutes(-300).unwrap();
        assert!(policy.same_day(at("2026-03-01T12:00:00Z"), at("2026-03-02T03:00:00Z")));
        assert_eq!(
            policy.day_of(at("2026-03-02T03:00:00Z")),
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
        );
    }

    #[test]
    fn day_bounds_are_half_open_and_one_day_long() {
        let policy = DayPolicy::with_offset_minutes(120).unwrap();
        let (start, end) = policy.day_bounds(at("2026-03-01T10:00:00Z"));
        assert_eq!(start, at("2026-02-28T22:00:00Z"));
        assert_eq!(end, at("2026-03-01T22:00:00Z"));
    }

    #[test]
    fn out_of_range_offset_is_rejected() {
        assert!(DayPolicy::with_offset_minutes(24 * 60).is_none());
        assert!(DayPolicy::with_offset_minutes(i32::MAX).is_none());
    }
}
