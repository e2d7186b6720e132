//! Search result cache.
//!
//! Wraps any provider and reuses successful results for a while, so a
//! parameter refresh that lands on a recent search does not spend API quota.
//! Coordinates are rounded to 3 decimals (~110m) to improve hits; failures
//! are never cached.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use super::{PlacesProvider, SearchRequest};
use crate::config::PlacesConfig;
use crate::error::ProviderError;
use crate::types::Place;

/// Cache key: the request with coordinates rounded to 3 decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    latitude: i64,
    longitude: i64,
    radius_m: u32,
    price_level: u8,
    min_rating_tenths: i64,
}

impl From<&SearchRequest> for CacheKey {
    fn from(request: &SearchRequest) -> Self {
        Self {
            latitude: (request.location.latitude * 1000.0).round() as i64,
            longitude: (request.location.longitude * 1000.0).round() as i64,
            radius_m: request.radius_m,
            price_level: request.price_level,
            min_rating_tenths: (request.min_rating * 10.0).round() as i64,
        }
    }
}

struct CacheEntry {
    stored_at: Instant,
    places: Vec<Place>,
}

/// Provider decorator that remembers successful searches for `ttl`.
pub struct CachedPlaces<P: PlacesProvider> {
    inner: P,
    ttl: Duration,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl<P: PlacesProvider> CachedPlaces<P> {
    /// A zero `ttl` disables caching.
    pub fn new(inner: P, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Use `places.cache_ttl_secs` as the lifetime.
    pub fn from_config(inner: P, config: &PlacesConfig) -> Self {
        Self::new(inner, config.cache_ttl())
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    fn lookup(&self, key: &CacheKey) -> Option<Vec<Place>> {
        let mut entries = self.entries.lock().ok()?;
        let fresh = entries.get(key)?.stored_at.elapsed() < self.ttl;
        if fresh {
            entries.get(key).map(|entry| entry.places.clone())
        } else {
            entries.remove(key);
            None
        }
    }

    fn store(&self, key: CacheKey, places: &[Place]) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                key,
                CacheEntry {
                    stored_at: Instant::now(),
                    places: places.to_vec(),
                },
            );
        }
    }
}

#[async_trait]
impl<P: PlacesProvider> PlacesProvider for CachedPlaces<P> {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Place>, ProviderError> {
        if self.ttl.is_zero() {
            return self.inner.search(request).await;
        }

        let key = CacheKey::from(request);
        if let Some(places) = self.lookup(&key) {
            debug!("Places cache hit for {:?}", key);
            return Ok(places);
        }

        let places = self.inner.search(request).await?;
        self.store(key, &places);
        Ok(places)
    }
}
