//! Places-search provider interface.
//!
//! The engine treats a provider as a fallible lookup: it never retries and
//! it bounds every call with its own timeout. Retry policy belongs to the
//! caller. [`CachedPlaces`] can wrap any provider to reuse recent results.

pub mod cache;

#[cfg(feature = "google")]
pub mod google;

#[cfg(feature = "google")]
pub use google::GooglePlacesProvider;

pub use cache::CachedPlaces;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::types::{Location, Place, SearchParameters};

/// One nearby search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub location: Location,
    pub radius_m: u32,
    pub price_level: u8,
    pub min_rating: f64,
}

impl SearchRequest {
    pub fn new(location: Location, parameters: &SearchParameters) -> Self {
        Self {
            location,
            radius_m: parameters.distance,
            price_level: parameters.price_level,
            min_rating: parameters.min_rating,
        }
    }
}

/// Source of candidate places.
#[async_trait]
pub trait PlacesProvider: Send + Sync {
    /// Ordered candidates near `request.location`.
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Place>, ProviderError>;
}
