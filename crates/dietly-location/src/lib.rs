//! Location service for Dietly
//!
//! Finds where the user is, names the place and what food is nearby, and
//! remembers the answer for a while. Falls back to the last known or a
//! default position when the device can't be located.

pub mod amap;
pub mod cache;
pub mod clock;
pub mod error;
pub mod geo;
pub mod geocode;
pub mod platform;
pub mod policy;
pub mod positioner;
pub mod retry;
pub mod service;
pub mod setup;
pub mod state;
pub mod types;

pub use amap::{AmapClient, AmapIpPositioner};
pub use cache::{CacheKey, JsonFileCache, LocationCache, MemoryLocationCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::LocationError;
pub use geocode::{Geocoder, NominatimGeocoder, PlaceSearch};
pub use platform::SystemPositioner;
pub use positioner::{FallbackPositioner, Positioner};
pub use service::{LocationService, LocationServiceBuilder};
pub use setup::service_from_config;
pub use state::AcquisitionState;
pub use types::*;
