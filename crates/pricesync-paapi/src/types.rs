//! Wire types for the `GetItems` operation.
//!
//! Offers arrive under one of two resources: the legacy `Offers` block,
//! where a listing carries `Price.Amount` directly, and the current
//! `OffersV2` block, where the amount is nested under `Price.Money`. Both
//! are requested on every call and resolved in [`crate::normalize`]; nothing
//! past that module sees either shape.

use serde::{Deserialize, Serialize};

/// Resources requested for every item.
pub const REQUESTED_RESOURCES: &[&str] = &[
    "Offers.Listings.Price",
    "Offers.Listings.MerchantInfo",
    "Offers.Listings.IsBuyBoxWinner",
    "OffersV2.Listings.Price",
    "OffersV2.Listings.MerchantInfo",
    "OffersV2.Listings.IsBuyBoxWinner",
    "CustomerReviews.StarRating",
    "CustomerReviews.Count",
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetItemsRequest<'a> {
    pub item_ids: &'a [&'a str],
    pub resources: &'a [&'a str],
    pub partner_tag: &'a str,
    pub partner_type: &'a str,
    pub marketplace: &'a str,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetItemsResponse {
    #[serde(default)]
    pub items_result: Option<ItemsResult>,
    #[serde(default)]
    pub errors: Vec<ApiErrorEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemsResult {
    #[serde(default)]
    pub items: Vec<Item>,
}

/// Per-request or per-item error. Item-level errors name the identifier in
/// `message`, e.g. "The ItemId B000XXXXXX is not accessible ...".
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiErrorEntry {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Item {
    #[serde(rename = "ASIN")]
    pub asin: String,
    #[serde(rename = "DetailPageURL", default)]
    pub detail_page_url: Option<String>,
    #[serde(default)]
    pub offers: Option<LegacyOffers>,
    #[serde(rename = "OffersV2", default)]
    pub offers_v2: Option<CurrentOffers>,
    #[serde(default)]
    pub customer_reviews: Option<CustomerReviews>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LegacyOffers {
    #[serde(default)]
    pub listings: Vec<LegacyListing>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LegacyListing {
    #[serde(default)]
    pub price: Option<LegacyPrice>,
    #[serde(default)]
    pub merchant_info: Option<MerchantInfo>,
    #[serde(default)]
    pub is_buy_box_winner: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LegacyPrice {
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub display_amount: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CurrentOffers {
    #[serde(default)]
    pub listings: Vec<CurrentListing>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CurrentListing {
    #[serde(default)]
    pub price: Option<CurrentPrice>,
    #[serde(default)]
    pub merchant_info: Option<MerchantInfo>,
    #[serde(default)]
    pub is_buy_box_winner: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CurrentPrice {
    #[serde(default)]
    pub money: Option<Money>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Money {
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub display_amount: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MerchantInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomerReviews {
    #[serde(default)]
    pub star_rating: Option<StarRating>,
    #[serde(default)]
    pub count: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StarRating {
    #[serde(default)]
    pub value: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_pascal_case() {
        let ids = ["B000TEST01"];
        let request = GetItemsRequest {
            item_ids: &ids,
            resources: REQUESTED_RESOURCES,
            partner_tag: "store-20",
            partner_type: "Associates",
            marketplace: "www.amazon.com",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["ItemIds"][0], "B000TEST01");
        assert_eq!(json["PartnerTag"], "store-20");
        assert_eq!(json["PartnerType"], "Associates");
        assert_eq!(json["Marketplace"], "www.amazon.com");
        assert!(json["Resources"]
            .as_array()
            .unwrap()
            .iter()
            .any(|r| r == "OffersV2.Listings.Price"));
    }

    #[test]
    fn both_offer_shapes_deserialize() {
        let raw = serde_json::json!({
            "ItemsResult": {
                "Items": [{
                    "ASIN": "B000TEST01",
                    "DetailPageURL": "https://www.amazon.com/dp/B000TEST01?tag=store-20",
                    "Offers": { "Listings": [{
                        "Price": { "Amount": 19.99, "Currency": "USD", "DisplayAmount": "$19.99" },
                        "MerchantInfo": { "Name": "Amazon.com" },
                        "IsBuyBoxWinner": true
                    }]},
                    "OffersV2": { "Listings": [{
                        "Price": { "Money": { "Amount": 18.5, "Currency": "USD" } },
                        "MerchantInfo": { "Name": "Amazon.com", "Id": "ATVPDKIKX0DER" }
                    }]},
                    "CustomerReviews": { "StarRating": { "Value": 4.6 }, "Count": 1200 }
                }]
            }
        });
        let parsed: GetItemsResponse = serde_json::from_value(raw).unwrap();
        let item = &parsed.items_result.unwrap().items[0];
        assert_eq!(item.asin, "B000TEST01");
        let legacy = &item.offers.as_ref().unwrap().listings[0];
        assert_eq!(legacy.price.as_ref().unwrap().amount, Some(19.99));
        let current = &item.offers_v2.as_ref().unwrap().listings[0];
        assert_eq!(
            current.price.as_ref().unwrap().money.as_ref().unwrap().amount,
            Some(18.5)
        );
        assert_eq!(item.customer_reviews.as_ref().unwrap().count, Some(1200));
    }

    #[test]
    fn errors_only_response_deserializes() {
        let raw = r#"{"Errors":[{"Code":"InvalidParameterValue","Message":"The ItemId B0BAD is not valid."}]}"#;
        let parsed: GetItemsResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.items_result.is_none());
        assert_eq!(parsed.errors[0].code, "InvalidParameterValue");
    }
}
