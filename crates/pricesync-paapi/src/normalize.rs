//! Resolution of a `GetItems` response into one [`FetchedPrice`] per
//! requested identifier.
//!
//! The two offer schemas are folded into a single [`OfferShape`] union here
//! and resolved once. Within a shape the buy-box winner is preferred over
//! other priced listings, then the first priced listing wins. Merchant
//! trust is applied to whichever listing wins.

use std::collections::HashMap;

use pricesync_core::{FetchStatus, FetchedPrice};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::types::{ApiErrorEntry, CurrentListing, GetItemsResponse, Item, LegacyListing};

/// Error codes meaning the identifier is unknown or not offered to us.
const NOT_FOUND_CODES: &[&str] = &["ItemNotAccessible", "InvalidParameterValue", "NoResults"];

/// Merchants whose prices are never surfaced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MerchantPolicy {
    excluded: Vec<String>,
}

impl MerchantPolicy {
    #[must_use]
    pub fn new<I, S>(excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            excluded: excluded
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Case-insensitive containment check against every configured entry.
    #[must_use]
    pub fn is_excluded(&self, merchant: &str) -> bool {
        let name = merchant.trim().to_lowercase();
        !name.is_empty() && self.excluded.iter().any(|entry| name.contains(entry.as_str()))
    }
}

/// Competing listing shapes for one item, resolved by [`resolve_item`].
#[derive(Debug, Clone, Copy)]
pub enum OfferShape<'a> {
    Current(&'a [CurrentListing]),
    Legacy(&'a [LegacyListing]),
}

/// A listing reduced to the fields resolution cares about.
#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    price: Option<Decimal>,
    merchant: Option<String>,
    buy_box: bool,
}

impl OfferShape<'_> {
    fn candidates(self) -> Vec<Candidate> {
        match self {
            OfferShape::Current(listings) => listings
                .iter()
                .map(|l| Candidate {
                    price: l
                        .price
                        .as_ref()
                        .and_then(|p| p.money.as_ref())
                        .and_then(|m| m.amount)
                        .and_then(to_price),
                    merchant: l.merchant_info.as_ref().and_then(|m| m.name.clone()),
                    buy_box: l.is_buy_box_winner.unwrap_or(false),
                })
                .collect(),
            OfferShape::Legacy(listings) => listings
                .iter()
                .map(|l| Candidate {
                    price: l.price.as_ref().and_then(|p| p.amount).and_then(to_price),
                    merchant: l.merchant_info.as_ref().and_then(|m| m.name.clone()),
                    buy_box: l.is_buy_box_winner.unwrap_or(false),
                })
                .collect(),
        }
    }
}

fn to_price(amount: f64) -> Option<Decimal> {
    Decimal::from_f64(amount).map(|d| d.round_dp(2))
}

/// Picks the winning priced listing: buy-box winner first, else the first
/// listing with a positive price.
fn pick_winner(candidates: Vec<Candidate>) -> Option<Candidate> {
    let mut priced = candidates
        .into_iter()
        .filter(|c| c.price.is_some_and(|p| p > Decimal::ZERO));
    let first = priced.next()?;
    if first.buy_box {
        return Some(first);
    }
    Some(priced.find(|c| c.buy_box).unwrap_or(first))
}

/// Resolves one item into its canonical record.
#[must_use]
pub fn resolve_item(item: &Item, policy: &MerchantPolicy) -> FetchedPrice {
    let mut record = FetchedPrice::without_price(&item.asin, FetchStatus::OutOfStock);
    record.detail_url.clone_from(&item.detail_page_url);

    if let Some(reviews) = &item.customer_reviews {
        record.rating = reviews
            .star_rating
            .as_ref()
            .and_then(|s| s.value)
            .and_then(Decimal::from_f64)
            .map(|d| d.round_dp(2));
        record.rating_count = reviews.count.and_then(|c| i32::try_from(c).ok());
    }

    let mut shapes = Vec::with_capacity(2);
    if let Some(current) = &item.offers_v2 {
        shapes.push(OfferShape::Current(&current.listings));
    }
    if let Some(legacy) = &item.offers {
        shapes.push(OfferShape::Legacy(&legacy.listings));
    }

    let Some(winner) = shapes
        .into_iter()
        .find_map(|shape| pick_winner(shape.candidates()))
    else {
        return record;
    };

    record.merchant.clone_from(&winner.merchant);
    if winner
        .merchant
        .as_deref()
        .is_some_and(|m| policy.is_excluded(m))
    {
        record.status = FetchStatus::Excluded;
        record.price = Decimal::ZERO;
        return record;
    }

    record.status = FetchStatus::Ok;
    record.price = winner.price.unwrap_or(Decimal::ZERO);
    record
}

/// Builds exactly one record per entry of `requested`, in request order.
///
/// Identifiers named by a not-found error are [`FetchStatus::NotFound`];
/// identifiers the response is silent about are [`FetchStatus::Error`] so
/// the fallback chain gets a chance at them.
#[must_use]
pub fn normalize_response(
    requested: &[String],
    response: &GetItemsResponse,
    policy: &MerchantPolicy,
) -> Vec<FetchedPrice> {
    let by_id: HashMap<&str, &Item> = response
        .items_result
        .iter()
        .flat_map(|r| r.items.iter())
        .map(|item| (item.asin.as_str(), item))
        .collect();

    requested
        .iter()
        .map(|id| {
            if let Some(item) = by_id.get(id.as_str()) {
                return resolve_item(item, policy);
            }
            if names_not_found(&response.errors, id) {
                return FetchedPrice::without_price(id, FetchStatus::NotFound);
            }
            FetchedPrice::error(id)
        })
        .collect()
}

fn names_not_found(errors: &[ApiErrorEntry], id: &str) -> bool {
    errors
        .iter()
        .any(|e| NOT_FOUND_CODES.contains(&e.code.as_str()) && e.message.contains(id))
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
