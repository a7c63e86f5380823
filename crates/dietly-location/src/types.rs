use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LocationError;

/// Accuracy reported for the default-position fallback, in meters.
pub const FALLBACK_ACCURACY_METERS: f64 = 5000.0;

/// Longitude/latitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lng: f64,
    pub lat: f64,
}

impl Coordinates {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// True for finite values within [-180, 180] x [-90, 90].
    pub fn is_valid(&self) -> bool {
        self.lng.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lng)
            && (-90.0..=90.0).contains(&self.lat)
    }

    /// `"lng,lat"` with six decimals, the format map web services expect.
    pub fn to_query_value(&self) -> String {
        format!("{:.6},{:.6}", self.lng, self.lat)
    }

    /// Parse a `"lng,lat"` pair.
    pub fn parse(value: &str) -> Option<Self> {
        let (lng, lat) = value.split_once(',')?;
        let coords = Self::new(lng.trim().parse().ok()?, lat.trim().parse().ok()?);
        coords.is_valid().then_some(coords)
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}, {:.6}", self.lng, self.lat)
    }
}

/// Structured locality breakdown from reverse geocoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub province: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_address: Option<String>,
}

impl Address {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Short locality label, e.g. "Beijing Dongcheng".
    ///
    /// Municipalities report no city, so the province stands in for it.
    pub fn locality(&self) -> Option<String> {
        let city = self.city.as_deref().or(self.province.as_deref());
        let parts: Vec<&str> = [city, self.district.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// Provenance of a position fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationSource {
    #[serde(rename = "GPS")]
    Gps,
    #[serde(rename = "WIFI")]
    NetworkWifi,
    #[serde(rename = "CELL")]
    CellTower,
    #[serde(rename = "IP")]
    IpAddress,
}

impl LocationSource {
    /// Best guess for platforms that don't report provenance.
    pub fn from_accuracy(accuracy_meters: f64) -> Self {
        match accuracy_meters {
            a if a <= 50.0 => Self::Gps,
            a if a <= 500.0 => Self::NetworkWifi,
            a if a <= 5000.0 => Self::CellTower,
            _ => Self::IpAddress,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Gps => "GPS",
            Self::NetworkWifi => "Wi-Fi network",
            Self::CellTower => "cell tower",
            Self::IpAddress => "IP address",
        }
    }

    /// IP-derived positions are city-level at best.
    pub fn is_coarse(&self) -> bool {
        matches!(self, Self::IpAddress)
    }
}

/// Point of interest near the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyPlace {
    pub id: String,
    pub name: String,
    pub category: String,
    pub distance_meters: u32,
    pub address: String,
    /// Used to recompute distances; not every provider reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Coordinates>,
}

/// A located, geocoded position. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSnapshot {
    pub position: Coordinates,
    #[serde(default)]
    pub address: Address,
    /// Estimated error radius in meters
    pub accuracy: f64,
    pub source: LocationSource,
    pub captured_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nearby_places: Option<Vec<NearbyPlace>>,
}

impl LocationSnapshot {
    /// True while `captured_at + expiry` is still in the future.
    ///
    /// An expiry end that cannot be represented counts as stale.
    pub fn is_fresh(&self, now: DateTime<Utc>, expiry: Duration) -> bool {
        chrono::Duration::from_std(expiry)
            .ok()
            .and_then(|expiry| self.captured_at.checked_add_signed(expiry))
            .is_some_and(|end| now < end)
    }

    /// Same snapshot marked as a coarse, fallback-quality position.
    pub fn degraded(mut self) -> Self {
        self.source = LocationSource::IpAddress;
        self
    }

    /// One-line notice for the toast shown after locating.
    pub fn user_notice(&self) -> String {
        let place = self.address.locality().unwrap_or_else(|| self.position.to_string());
        if self.source.is_coarse() {
            format!("Using approximate location: {place} (check location permission)")
        } else {
            format!("Located: {place}")
        }
    }
}

/// Platform location permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    Prompt,
    #[default]
    Unknown,
}

/// Raw output of a positioner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionFix {
    pub position: Coordinates,
    pub accuracy: f64,
    pub source: LocationSource,
}

/// Options passed to a positioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    pub enable_high_accuracy: bool,
    pub timeout: Duration,
    /// Oldest platform-cached fix the positioner may return
    pub maximum_age: Duration,
}

/// Per-call acquisition settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationRequest {
    pub enable_high_accuracy: bool,
    pub timeout_ms: u64,
    pub enable_cache: bool,
    pub cache_expiry_minutes: u32,
    pub fetch_nearby_places: bool,
    pub place_search_radius_meters: u32,
}

impl Default for LocationRequest {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            timeout_ms: 10_000,
            enable_cache: true,
            cache_expiry_minutes: 30,
            fetch_nearby_places: false,
            place_search_radius_meters: 500,
        }
    }
}

impl From<&dietly_core::LocationSettings> for LocationRequest {
    fn from(settings: &dietly_core::LocationSettings) -> Self {
        Self {
            enable_high_accuracy: settings.enable_high_accuracy,
            timeout_ms: settings.timeout_ms,
            enable_cache: settings.enable_cache,
            cache_expiry_minutes: settings.cache_expiry_minutes,
            fetch_nearby_places: settings.fetch_nearby_places,
            place_search_radius_meters: settings.place_search_radius_meters,
        }
    }
}

impl LocationRequest {
    /// Reject settings no acquisition could honor.
    ///
    /// # Errors
    /// Returns `LocationError::ConfigInvalid` for a zero timeout or an
    /// out-of-range search radius.
    pub fn validate(&self) -> Result<(), LocationError> {
        if self.timeout_ms == 0 {
            return Err(LocationError::ConfigInvalid(
                "timeout must be greater than 0 ms".to_string(),
            ));
        }
        if self.fetch_nearby_places {
            let radius = self.place_search_radius_meters;
            if radius == 0 || radius > dietly_core::config::MAX_PLACE_SEARCH_RADIUS_METERS {
                return Err(LocationError::ConfigInvalid(format!(
                    "place search radius {} m is outside 1..={} m",
                    radius,
                    dietly_core::config::MAX_PLACE_SEARCH_RADIUS_METERS
                )));
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cache_expiry(&self) -> Duration {
        Duration::from_secs(u64::from(self.cache_expiry_minutes) * 60)
    }

    pub fn position_options(&self) -> PositionOptions {
        PositionOptions {
            enable_high_accuracy: self.enable_high_accuracy,
            timeout: self.timeout(),
            maximum_age: Duration::ZERO,
        }
    }
}
