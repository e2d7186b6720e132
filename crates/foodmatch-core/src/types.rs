//! Shared types for foodmatch-core.
//!
//! Sessions are fixed-shape records; the engine hands out snapshots of them
//! and never references into the store.

use std::collections::{BTreeSet, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Highest price tier accepted by the places API.
pub const MAX_PRICE_LEVEL: u8 = 4;
/// Lowest accepted minimum rating.
pub const MIN_RATING: f64 = 1.0;
/// Highest accepted minimum rating.
pub const MAX_RATING: f64 = 5.0;

// ─────────────────────────────────────────────────────────────────────────────
// Search Parameters
// ─────────────────────────────────────────────────────────────────────────────

/// Filters one member chose for the session's search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchParameters {
    /// Search radius in meters
    pub distance: u32,
    /// Price tier, 0 (cheapest) to 4
    pub price_level: u8,
    /// Minimum rating, 1.0 to 5.0
    pub min_rating: f64,
}

impl SearchParameters {
    pub fn new(distance: u32, price_level: u8, min_rating: f64) -> Self {
        Self {
            distance,
            price_level,
            min_rating,
        }
    }

    /// Parse the raw text entered in the parameter form.
    ///
    /// Every field is required. The parsed values are validated before
    /// they are returned.
    pub fn parse(distance: &str, price_level: &str, min_rating: &str) -> Result<Self> {
        let distance = parse_field::<u32>("distance", distance)?;
        let price_level = parse_field::<u8>("price_level", price_level)?;
        let min_rating = parse_field::<f64>("min_rating", min_rating)?;

        let params = Self::new(distance, price_level, min_rating);
        params.validate()?;
        Ok(params)
    }

    /// Validate ranges: distance > 0, price level 0-4, rating 1.0-5.0.
    pub fn validate(&self) -> Result<()> {
        if self.distance == 0 {
            return Err(Error::invalid_parameters(
                "distance",
                "must be greater than 0",
            ));
        }

        if self.price_level > MAX_PRICE_LEVEL {
            return Err(Error::invalid_parameters(
                "price_level",
                format!("must be between 0 and {}", MAX_PRICE_LEVEL),
            ));
        }

        if !(MIN_RATING..=MAX_RATING).contains(&self.min_rating) {
            return Err(Error::invalid_parameters(
                "min_rating",
                format!("must be between {:.1} and {:.1}", MIN_RATING, MAX_RATING),
            ));
        }

        Ok(())
    }

    /// Apply the provided fields of an update; the rest keep their value.
    pub fn merge(&self, update: &ParameterUpdate) -> Self {
        Self {
            distance: update.distance.unwrap_or(self.distance),
            price_level: update.price_level.unwrap_or(self.price_level),
            min_rating: update.min_rating.unwrap_or(self.min_rating),
        }
    }
}

fn parse_field<T: std::str::FromStr>(field: &str, raw: &str) -> Result<T> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::invalid_parameters(field, "is required"));
    }
    raw.parse::<T>()
        .map_err(|_| Error::invalid_parameters(field, format!("cannot parse '{}'", raw)))
}

/// Partial parameter change; `None` fields are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterUpdate {
    pub distance: Option<u32>,
    pub price_level: Option<u8>,
    pub min_rating: Option<f64>,
}

impl ParameterUpdate {
    pub fn distance(mut self, distance: u32) -> Self {
        self.distance = Some(distance);
        self
    }

    pub fn price_level(mut self, price_level: u8) -> Self {
        self.price_level = Some(price_level);
        self
    }

    pub fn min_rating(mut self, min_rating: f64) -> Self {
        self.min_rating = Some(min_rating);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.distance.is_none() && self.price_level.is_none() && self.min_rating.is_none()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Places & Location
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(Error::invalid_parameters(
                "latitude",
                "must be between -90 and 90",
            ));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(Error::invalid_parameters(
                "longitude",
                "must be between -180 and 180",
            ));
        }
        Ok(())
    }
}

/// A candidate returned by the places provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Place {
    pub place_id: String,
    pub name: String,
    pub photo_reference: Option<String>,
}

impl Place {
    pub fn new(place_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            place_id: place_id.into(),
            name: name.into(),
            photo_reference: None,
        }
    }

    pub fn with_photo(mut self, photo_reference: impl Into<String>) -> Self {
        self.photo_reference = Some(photo_reference.into());
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// Members who liked one place.
///
/// The liked place is snapshotted so a record still names its place after
/// the candidate list has been refreshed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agreement {
    pub place: Place,
    pub voters: BTreeSet<String>,
}

/// Result of moving the session cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Advance {
    /// The cursor now points at this candidate index.
    Advanced(usize),
    /// Every candidate has been shown; the cursor stays at the end.
    Exhausted,
}

/// Agreement level for one liked place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgreementScore {
    pub place: Place,
    pub votes: usize,
    pub members: usize,
    /// Share of members who liked the place, 0-100
    pub percent: f64,
}

/// One group food-selection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub parameters: SearchParameters,
    pub location: Location,
    /// Replaced wholesale on refresh
    pub candidates: Vec<Place>,
    /// Shared swipe position, `0..=candidates.len()`
    pub cursor: usize,
    pub members: BTreeSet<String>,
    /// Like records in the order they were first created
    pub agreements: Vec<Agreement>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        parameters: SearchParameters,
        location: Location,
        candidates: Vec<Place>,
    ) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id: id.into(),
            parameters,
            location,
            candidates: dedup_places(candidates),
            cursor: 0,
            members: BTreeSet::new(),
            agreements: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Candidate currently presented, `None` once exhausted.
    pub fn current(&self) -> Option<&Place> {
        self.candidates.get(self.cursor)
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.candidates.len()
    }

    pub fn is_member(&self, user_id: &str) -> bool {
        self.members.contains(user_id)
    }

    pub fn candidate(&self, place_id: &str) -> Option<&Place> {
        self.candidates.iter().find(|p| p.place_id == place_id)
    }

    /// Members who liked a place, if anyone has.
    pub fn voters(&self, place_id: &str) -> Option<&BTreeSet<String>> {
        self.agreements
            .iter()
            .find(|a| a.place.place_id == place_id)
            .map(|a| &a.voters)
    }

    /// Add a member. Returns false when already present.
    pub(crate) fn add_member(&mut self, user_id: &str) -> bool {
        let added = self.members.insert(user_id.to_string());
        if added {
            self.touch();
        }
        added
    }

    /// Move the cursor forward without wrapping.
    pub(crate) fn advance(&mut self) -> Advance {
        if self.is_exhausted() {
            return Advance::Exhausted;
        }
        self.cursor += 1;
        self.touch();
        if self.is_exhausted() {
            Advance::Exhausted
        } else {
            Advance::Advanced(self.cursor)
        }
    }

    /// Record a like for `place`, creating its agreement record if needed.
    pub(crate) fn like(&mut self, place: &Place, user_id: &str) {
        match self
            .agreements
            .iter_mut()
            .find(|a| a.place.place_id == place.place_id)
        {
            Some(agreement) => {
                agreement.voters.insert(user_id.to_string());
            }
            None => self.agreements.push(Agreement {
                place: place.clone(),
                voters: BTreeSet::from([user_id.to_string()]),
            }),
        }
        self.touch();
    }

    /// Withdraw a like. Records left without voters are dropped.
    pub(crate) fn unlike(&mut self, place_id: &str, user_id: &str) {
        if let Some(agreement) = self
            .agreements
            .iter_mut()
            .find(|a| a.place.place_id == place_id)
        {
            agreement.voters.remove(user_id);
        }
        self.agreements.retain(|a| !a.voters.is_empty());
        self.touch();
    }

    /// Install a fresh search result and restart swiping.
    pub(crate) fn refresh(
        &mut self,
        parameters: SearchParameters,
        candidates: Vec<Place>,
        clear_agreements: bool,
    ) {
        self.parameters = parameters;
        self.candidates = dedup_places(candidates);
        self.cursor = 0;
        if clear_agreements {
            self.agreements.clear();
        }
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now().timestamp_millis();
    }
}

/// Keep the first occurrence of every place id.
fn dedup_places(places: Vec<Place>) -> Vec<Place> {
    let mut seen = HashSet::new();
    places
        .into_iter()
        .filter(|p| seen.insert(p.place_id.clone()))
        .collect()
}
