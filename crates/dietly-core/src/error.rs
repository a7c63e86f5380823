//! Centralized error types for the Dietly application.
//!
//! Every error that reaches the UI is convertible to [`AppError`], which
//! carries a user-facing message alongside the full error for logging.

use thiserror::Error;

/// Top-level application error type.
///
/// Use `user_message()` for toasts and `banner_message()` for the error banner.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Location error: {0}")]
    Location(#[from] LocationFailure),

    /// A backend command rejected; the payload is the backend's raw message.
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Returns a user-friendly message suitable for display in the UI.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Network(e) => e.user_message(),
            AppError::Config(e) => e.user_message(),
            AppError::Location(e) => e.user_message(),
            AppError::Backend(_) => "Something went wrong.",
            AppError::Io(_) => "A file operation failed. Please try again.",
            AppError::Other(_) => "An unexpected error occurred. Please try again.",
        }
    }

    /// Banner text: backend failures get the raw backend message appended.
    pub fn banner_message(&self) -> String {
        match self {
            AppError::Backend(raw) if !raw.trim().is_empty() => {
                format!("{} {}", self.user_message(), raw.trim())
            }
            _ => self.user_message().to_string(),
        }
    }

    /// Whether the UI should offer a retry affordance.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Network(NetworkError::Timeout | NetworkError::ConnectionFailed(_)) => true,
            AppError::Location(_) => true,
            _ => false,
        }
    }
}

/// Network-related errors (HTTP, connectivity).
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl NetworkError {
    pub fn user_message(&self) -> &'static str {
        match self {
            NetworkError::ConnectionFailed(_) => {
                "Unable to connect. Check your internet connection."
            }
            NetworkError::Timeout => "The request timed out. Please try again.",
            NetworkError::ServerError { status, .. } if *status >= 500 => {
                "The server is experiencing issues. Please try again later."
            }
            NetworkError::ServerError { .. } => "The request failed. Please try again.",
            NetworkError::InvalidResponse(_) => {
                "Received an unexpected response. Please try again."
            }
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
        }
    }
}

/// Location acquisition failures as seen by the UI.
#[derive(Debug, Error)]
pub enum LocationFailure {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Position unavailable: {0}")]
    Unavailable(String),

    #[error("Positioning timed out")]
    Timeout,

    #[error("A location request is already in progress")]
    Busy,
}

impl LocationFailure {
    pub fn user_message(&self) -> &'static str {
        match self {
            LocationFailure::PermissionDenied => {
                "Location permission was denied. Enable location access in your system settings."
            }
            LocationFailure::Unavailable(_) => {
                "Your position is unavailable right now. Check your network and try again."
            }
            LocationFailure::Timeout => "Locating took too long. Please try again.",
            LocationFailure::Busy => "Already locating, please wait.",
        }
    }
}

/// Extension trait for converting reqwest errors to our error types.
pub trait ReqwestErrorExt {
    fn into_network_error(self) -> NetworkError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_network_error(self) -> NetworkError {
        if self.is_timeout() {
            NetworkError::Timeout
        } else if self.is_connect() {
            NetworkError::ConnectionFailed(self.to_string())
        } else if let Some(status) = self.status() {
            NetworkError::ServerError {
                status: status.as_u16(),
                message: self.to_string(),
            }
        } else if self.is_decode() {
            NetworkError::InvalidResponse(self.to_string())
        } else {
            NetworkError::ConnectionFailed(self.to_string())
        }
    }
}
