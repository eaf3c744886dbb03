//! Per-listing outcomes and the run-level summary built from them.

use pricesync_db::SyncRunCounts;
use pricesync_scraper::FallbackTier;
use rust_decimal::Decimal;
use serde::Serialize;

/// Where a committed price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceOrigin {
    Api,
    StaticPage,
    Browser,
}

impl From<FallbackTier> for PriceOrigin {
    fn from(tier: FallbackTier) -> Self {
        match tier {
            FallbackTier::StaticPage => PriceOrigin::StaticPage,
            FallbackTier::Browser => PriceOrigin::Browser,
        }
    }
}

impl PriceOrigin {
    #[must_use]
    pub fn is_fallback(self) -> bool {
        !matches!(self, PriceOrigin::Api)
    }
}

/// How a large jump against the stored price was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyResolution {
    /// The jump was within threshold; no recheck happened.
    None,
    /// The recheck agreed with the jump.
    Confirmed,
    /// The recheck came back near the stored price.
    Reverted,
    /// The recheck matched neither; its price was committed anyway.
    Unconfirmed,
}

/// Per-listing failures that leave the stored row untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SoftFailure {
    /// The source does not know the identifier.
    NotFound,
    /// The source failed and every fallback tier failed too.
    FetchFailed,
    /// An anomaly recheck produced no usable price.
    RecheckFailed,
}

impl SoftFailure {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SoftFailure::NotFound => "not_found",
            SoftFailure::FetchFailed => "fetch_failed",
            SoftFailure::RecheckFailed => "recheck_failed",
        }
    }
}

/// Terminal state of one listing's cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ListingOutcome {
    Committed {
        price: Decimal,
        origin: PriceOrigin,
        anomaly: AnomalyResolution,
        /// Whether a new history observation was written.
        appended: bool,
    },
    /// Winning merchant is excluded; committed with price `0`.
    Excluded,
    /// No listing carries a price and no fallback recovered one; committed
    /// with price `0`.
    OutOfStock,
    SoftFailure { reason: SoftFailure },
    /// Not an active catalog listing.
    Unknown,
    /// Already handled earlier in this run.
    Duplicate,
}

impl ListingOutcome {
    /// Returns `true` when the listing row was written this cycle.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(
            self,
            ListingOutcome::Committed { .. } | ListingOutcome::Excluded | ListingOutcome::OutOfStock
        )
    }
}

/// Outcome counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub seen: usize,
    pub ok: usize,
    pub recovered: usize,
    pub excluded: usize,
    pub out_of_stock: usize,
    pub soft_failures: usize,
    pub anomalies: usize,
    pub unconfirmed_anomalies: usize,
    pub observations_appended: usize,
    pub unknown: usize,
    pub duplicates: usize,
    /// Queue messages whose body named no identifier.
    pub malformed: usize,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &ListingOutcome) {
        self.seen += 1;
        match outcome {
            ListingOutcome::Committed {
                origin,
                anomaly,
                appended,
                ..
            } => {
                if origin.is_fallback() {
                    self.recovered += 1;
                } else {
                    self.ok += 1;
                }
                if *anomaly != AnomalyResolution::None {
                    self.anomalies += 1;
                }
                if *anomaly == AnomalyResolution::Unconfirmed {
                    self.unconfirmed_anomalies += 1;
                }
                if *appended {
                    self.observations_appended += 1;
                }
            }
            ListingOutcome::Excluded => self.excluded += 1,
            ListingOutcome::OutOfStock => self.out_of_stock += 1,
            ListingOutcome::SoftFailure { .. } => self.soft_failures += 1,
            ListingOutcome::Unknown => self.unknown += 1,
            ListingOutcome::Duplicate => self.duplicates += 1,
        }
    }

    /// Listings whose row was written.
    #[must_use]
    pub fn committed(&self) -> usize {
        self.ok + self.recovered + self.excluded + self.out_of_stock
    }

    #[must_use]
    pub fn to_counts(&self) -> SyncRunCounts {
        let clamp = |n: usize| i32::try_from(n).unwrap_or(i32::MAX);
        SyncRunCounts {
            listings_seen: clamp(self.seen),
            committed: clamp(self.committed()),
            recovered: clamp(self.recovered),
            soft_failures: clamp(self.soft_failures),
            anomalies: clamp(self.anomalies),
        }
    }

    /// Emits the run-level summary line.
    pub fn log(&self, run: &str) {
        tracing::info!(
            run,
            seen = self.seen,
            ok = self.ok,
            fallback = self.recovered,
            excluded = self.excluded,
            out_of_stock = self.out_of_stock,
            soft_failures = self.soft_failures,
            anomalies = self.anomalies,
            unconfirmed_anomalies = self.unconfirmed_anomalies,
            appended = self.observations_appended,
            unknown = self.unknown,
            duplicates = self.duplicates,
            malformed = self.malformed,
            cancelled = self.cancelled,
            "sync run finished"
        );
    }
}
