//! Write policy and read windows for the per-listing price history.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::calendar::DayPolicy;
use crate::listings::PriceObservation;

/// Outcome of checking a candidate observation against the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendDecision {
    Append,
    /// Today already has an observation at this exact price.
    UnchangedToday,
    /// Zero or negative prices never enter history.
    Sentinel,
}

/// Decides whether `price` observed at `observed_at` should be appended,
/// given the most recent observation already stored for the listing.
#[must_use]
pub fn decide_append(
    latest: Option<&PriceObservation>,
    price: Decimal,
    observed_at: DateTime<Utc>,
    days: DayPolicy,
) -> AppendDecision {
    if price <= Decimal::ZERO {
        return AppendDecision::Sentinel;
    }
    match latest {
        Some(last) if days.same_day(last.observed_at, observed_at) && last.price == price => {
            AppendDecision::UnchangedToday
        }
        _ => AppendDecision::Append,
    }
}

/// Trailing windows the trend engine reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryWindow {
    Last7Days,
    Last30Days,
}

impl HistoryWindow {
    #[must_use]
    pub fn days(self) -> i64 {
        match self {
            HistoryWindow::Last7Days => 7,
            HistoryWindow::Last30Days => 30,
        }
    }

    /// Inclusive lower bound of the window ending at `now`.
    #[must_use]
    pub fn since(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.days())
    }

    #[must_use]
    pub fn contains(self, now: DateTime<Utc>, instant: DateTime<Utc>) -> bool {
        instant >= self.since(now) && instant <= now
    }
}
