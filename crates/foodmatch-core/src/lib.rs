//! foodmatch-core - Core library for FoodMatch
//!
//! A group of co-located users picks a restaurant together: one member sets
//! the search parameters, everyone swipes through the candidates, and the
//! engine reports the places every member liked.
//!
//! - **session**: Session store and the swipe/consensus engine
//! - **places**: Places-search provider interface, result cache and the Google client
//! - **location**: Location provider interface
//! - **consensus**: Agreement tallies and the ranked consensus list
//! - **config**: TOML configuration

pub mod config;
pub mod consensus;
pub mod error;
pub mod location;
pub mod places;
pub mod session;
pub mod types;

// Re-export commonly used types
pub use config::{Config, EngineConfig, PlacesConfig};
pub use error::{Error, ProviderError, Result};
pub use location::{LatestLocation, LocationProvider};
pub use places::{CachedPlaces, PlacesProvider, SearchRequest};
pub use session::{SessionEngine, SessionStore};
pub use types::{
    Advance, Agreement, AgreementScore, Location, ParameterUpdate, Place, SearchParameters,
    Session,
};
