//! Location provider interface.
//!
//! Device GPS polling lives in the presentation layer; it pushes fixes into
//! a [`LatestLocation`] and the engine reads them through [`LocationProvider`].

use std::sync::RwLock;

use tracing::debug;

use crate::error::{Error, Result};
use crate::types::Location;

/// Source of the device's current coordinates.
pub trait LocationProvider: Send + Sync {
    /// Most recent fix, or `None` while waiting for one.
    fn current_location(&self) -> Option<Location>;
}

impl LocationProvider for Location {
    fn current_location(&self) -> Option<Location> {
        Some(*self)
    }
}

/// Latest GPS fix reported by the device.
#[derive(Debug, Default)]
pub struct LatestLocation {
    fix: RwLock<Option<Location>>,
}

impl LatestLocation {
    pub fn new() -> Self {
        Self::default()
    }

    /// GPS callback entry point.
    pub fn update(&self, latitude: f64, longitude: f64) -> Result<()> {
        let location = Location::new(latitude, longitude);
        location.validate()?;

        let mut fix = self.fix.write().map_err(|_| Error::LockPoisoned)?;
        *fix = Some(location);
        debug!("Location obtained: {}, {}", latitude, longitude);
        Ok(())
    }

    /// Forget the current fix (e.g. GPS disabled).
    pub fn clear(&self) -> Result<()> {
        let mut fix = self.fix.write().map_err(|_| Error::LockPoisoned)?;
        *fix = None;
        Ok(())
    }
}

impl LocationProvider for LatestLocation {
    fn current_location(&self) -> Option<Location> {
        self.fix.read().ok().and_then(|fix| *fix)
    }
}
