//! Location-specific error types.

use std::time::Duration;

use dietly_core::{AppError, ConfigError, LocationFailure};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Position unavailable: {0}")]
    PositionUnavailable(String),

    #[error("Positioning timed out after {0:?}")]
    Timeout(Duration),

    #[error("Reverse geocoding failed: {0}")]
    GeocodeFailed(String),

    #[error("Nearby place search failed: {0}")]
    PlaceSearchFailed(String),

    #[error("Invalid location configuration: {0}")]
    ConfigInvalid(String),

    #[error("A location request is already in progress")]
    AlreadyInProgress,

    #[error("Location error: {0}")]
    Other(String),
}

impl LocationError {
    /// User-friendly error message for UI display.
    pub fn user_message(&self) -> String {
        match self {
            Self::PermissionDenied => {
                "Location permission was denied. Enable location access in your system settings."
                    .to_string()
            }
            Self::PositionUnavailable(_) => {
                "Your position is unavailable right now. Check your network and try again."
                    .to_string()
            }
            Self::Timeout(d) => format!(
                "Locating took longer than {} seconds. Please try again.",
                d.as_secs().max(1)
            ),
            Self::GeocodeFailed(_) => "Address lookup failed".to_string(),
            Self::PlaceSearchFailed(_) => "Nearby places are unavailable".to_string(),
            Self::ConfigInvalid(msg) => format!("Location settings are invalid: {}", msg),
            Self::AlreadyInProgress => "Already locating, please wait.".to_string(),
            Self::Other(_) => "Locating failed. Please try again.".to_string(),
        }
    }

    /// Whether the user can usefully retry.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::ConfigInvalid(_))
    }

    /// Failures of the positioning step that the fallback policy may cover.
    pub fn is_acquisition_failure(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied | Self::PositionUnavailable(_) | Self::Timeout(_)
        )
    }
}

impl From<LocationError> for AppError {
    fn from(e: LocationError) -> Self {
        match e {
            LocationError::PermissionDenied => AppError::Location(LocationFailure::PermissionDenied),
            LocationError::PositionUnavailable(s) => {
                AppError::Location(LocationFailure::Unavailable(s))
            }
            LocationError::Timeout(_) => AppError::Location(LocationFailure::Timeout),
            LocationError::AlreadyInProgress => AppError::Location(LocationFailure::Busy),
            LocationError::ConfigInvalid(s) => AppError::Config(ConfigError::Invalid(s)),
            LocationError::GeocodeFailed(s) | LocationError::PlaceSearchFailed(s) => {
                AppError::Location(LocationFailure::Unavailable(s))
            }
            LocationError::Other(s) => AppError::Other(anyhow::anyhow!(s)),
        }
    }
}
