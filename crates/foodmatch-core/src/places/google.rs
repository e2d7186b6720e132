//! Google Places Nearby Search client.
//!
//! ```rust,no_run
//! use foodmatch_core::places::GooglePlacesProvider;
//! use foodmatch_core::Config;
//!
//! # fn main() -> foodmatch_core::Result<()> {
//! let config = Config::load()?;
//! let provider = GooglePlacesProvider::new(&config.places)?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{PlacesProvider, SearchRequest};
use crate::config::{ConfigValidationError, PlacesConfig};
use crate::error::{ProviderError, Result};
use crate::types::Place;

/// Places provider backed by the Google Places HTTP API
#[derive(Clone)]
pub struct GooglePlacesProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    place_type: String,
}

impl GooglePlacesProvider {
    pub fn new(config: &PlacesConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(ConfigValidationError::MissingApiKey.into());
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ProviderError::unavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            place_type: config.place_type.clone(),
        })
    }
}

#[async_trait]
impl PlacesProvider for GooglePlacesProvider {
    async fn search(&self, request: &SearchRequest) -> std::result::Result<Vec<Place>, ProviderError> {
        let location = format!(
            "{},{}",
            request.location.latitude, request.location.longitude
        );
        debug!("Nearby search at {} within {}m", location, request.radius_m);

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("location", location),
                ("radius", request.radius_m.to_string()),
                ("minprice", request.price_level.to_string()),
                ("rating", request.min_rating.to_string()),
                ("type", self.place_type.clone()),
                ("key", self.api_key.clone()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::unavailable("request timed out")
                } else {
                    ProviderError::unavailable(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::rate_limited(format!("status {}", status)));
        }
        if !status.is_success() {
            warn!("Failed to fetch places: status {}", status);
            return Err(ProviderError::unavailable(format!("status {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::unavailable(format!("failed to read response: {}", e)))?;

        parse_nearby_search(&body, request.min_rating)
    }
}

#[derive(Debug, Deserialize)]
struct NearbySearchResponse {
    #[serde(default)]
    results: Vec<RawPlace>,
    status: Option<String>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPlace {
    place_id: Option<String>,
    name: Option<String>,
    rating: Option<f64>,
    #[serde(default)]
    photos: Vec<RawPhoto>,
}

#[derive(Debug, Deserialize)]
struct RawPhoto {
    photo_reference: Option<String>,
}

/// Decode a Nearby Search body into candidates.
///
/// Records without a `place_id` cannot be voted on and are skipped. Records
/// rated below `min_rating` are dropped; unrated records are kept.
pub fn parse_nearby_search(
    body: &str,
    min_rating: f64,
) -> std::result::Result<Vec<Place>, ProviderError> {
    let response: NearbySearchResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::unavailable(format!("failed to decode response: {}", e)))?;

    let detail = response.error_message.unwrap_or_default();
    match response.status.as_deref() {
        None | Some("OK") | Some("ZERO_RESULTS") => {}
        Some("OVER_QUERY_LIMIT") => return Err(ProviderError::rate_limited(detail)),
        Some(other) => {
            warn!("Places search returned {}: {}", other, detail);
            let reason = format!("{} {}", other, detail);
            return Err(ProviderError::unavailable(reason.trim()));
        }
    }

    let places = response
        .results
        .into_iter()
        .filter_map(|raw| {
            let Some(place_id) = raw.place_id else {
                warn!("Skipping place without place_id: {:?}", raw.name);
                return None;
            };
            if raw.rating.is_some_and(|rating| rating < min_rating) {
                return None;
            }
            Some(Place {
                place_id,
                name: raw.name.unwrap_or_default(),
                photo_reference: raw.photos.into_iter().next().and_then(|p| p.photo_reference),
            })
        })
        .collect();

    Ok(places)
}
