//! Discount and "lowest in N days" signals derived from price history.
//!
//! Days with many samples must not outweigh quiet days, so the monthly mean
//! is an average of daily averages rather than of raw samples. Badges are
//! gated on a significant drop below that mean so noise-level dips do not
//! light up the storefront.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::calendar::DayPolicy;
use crate::ledger::HistoryWindow;
use crate::listings::PriceObservation;

/// Business thresholds for badges and discounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendPolicy {
    /// A badge requires `current < mean × ratio`.
    pub significant_drop_ratio: Decimal,
    /// Discounts below this whole percentage are omitted.
    pub min_discount_percent: u32,
}

impl Default for TrendPolicy {
    fn default() -> Self {
        Self {
            significant_drop_ratio: Decimal::new(98, 2),
            min_discount_percent: 5,
        }
    }
}

/// Derived, never-persisted view over a listing's recent history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrendSnapshot {
    /// Mean of daily means over 30 days; `None` with fewer than two samples.
    pub average_price_30d: Option<Decimal>,
    pub lowest_price_30d: Option<Decimal>,
    pub lowest_price_7d: Option<Decimal>,
    pub is_lowest_in_30d: bool,
    pub is_lowest_in_7d: bool,
    /// Whole-percent discount against the monthly mean, only when at least
    /// [`TrendPolicy::min_discount_percent`].
    pub discount_percent: Option<u32>,
}

/// Computes [`TrendSnapshot`]s under a fixed policy and day boundary.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrendEngine {
    policy: TrendPolicy,
    days: DayPolicy,
}

impl TrendEngine {
    #[must_use]
    pub fn new(policy: TrendPolicy, days: DayPolicy) -> Self {
        Self { policy, days }
    }

    #[must_use]
    pub fn policy(&self) -> TrendPolicy {
        self.policy
    }

    /// Builds the snapshot for `current_price` from `history` as of `now`.
    ///
    /// `history` may be in any order and may include samples outside the
    /// 30-day window or zero-priced sentinels; both are ignored.
    #[must_use]
    pub fn compute(
        &self,
        history: &[PriceObservation],
        current_price: Decimal,
        now: DateTime<Utc>,
    ) -> TrendSnapshot {
        let month: Vec<&PriceObservation> = history
            .iter()
            .filter(|o| o.price > Decimal::ZERO)
            .filter(|o| HistoryWindow::Last30Days.contains(now, o.observed_at))
            .collect();

        let lowest_price_30d = month.iter().map(|o| o.price).min();
        let lowest_price_7d = month
            .iter()
            .filter(|o| HistoryWindow::Last7Days.contains(now, o.observed_at))
            .map(|o| o.price)
            .min();

        let mut snapshot = TrendSnapshot {
            average_price_30d: None,
            lowest_price_30d,
            lowest_price_7d,
            ..TrendSnapshot::default()
        };

        if month.len() < 2 {
            return snapshot;
        }
        let Some(mean) = self.mean_of_daily_means(&month) else {
            return snapshot;
        };
        snapshot.average_price_30d = Some(mean.round_dp(2));

        if current_price <= Decimal::ZERO {
            return snapshot;
        }

        snapshot.discount_percent = self.discount_percent(mean, current_price);

        let significant_drop = current_price < mean * self.policy.significant_drop_ratio;
        if significant_drop {
            snapshot.is_lowest_in_30d = lowest_price_30d.is_some_and(|low| current_price <= low);
            snapshot.is_lowest_in_7d = !snapshot.is_lowest_in_30d
                && lowest_price_7d.is_some_and(|low| current_price <= low);
        }

        snapshot
    }

    fn mean_of_daily_means(&self, samples: &[&PriceObservation]) -> Option<Decimal> {
        let mut by_day: BTreeMap<NaiveDate, (Decimal, u32)> = BTreeMap::new();
        for o in samples {
            let entry = by_day
                .entry(self.days.day_of(o.observed_at))
                .or_insert((Decimal::ZERO, 0));
            entry.0 += o.price;
            entry.1 += 1;
        }
        if by_day.is_empty() {
            return None;
        }

        let day_count = Decimal::from(by_day.len());
        let sum_of_daily: Decimal = by_day
            .values()
            .map(|(sum, n)| *sum / Decimal::from(*n))
            .sum();
        Some(sum_of_daily / day_count)
    }

    fn discount_percent(&self, mean: Decimal, current_price: Decimal) -> Option<u32> {
        if mean <= Decimal::ZERO {
            return None;
        }
        let raw = (mean - current_price) / mean * Decimal::ONE_HUNDRED;
        let rounded = raw
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_u32()?;
        (rounded >= self.policy.min_discount_percent).then_some(rounded)
    }
}

#[cfg(test)]
#[path = "trend_test.rs"]
mod tests;
