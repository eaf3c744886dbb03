//! Signed client for the marketplace product API and the normalization of
//! its two competing offer schemas into [`pricesync_core::FetchedPrice`].

pub mod client;
pub mod error;
pub mod normalize;
pub mod types;

pub use client::{PaapiClient, PaapiSettings};
pub use error::PaapiError;
pub use normalize::{normalize_response, MerchantPolicy};
pub use types::GetItemsResponse;
