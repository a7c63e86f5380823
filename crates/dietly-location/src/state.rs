//! Acquisition state machine.
//!
//! `Idle → Requesting → {Succeeded, Denied, Unavailable, TimedOut}`, and the
//! three failure states resolve to `FallbackApplied` or `Failed`. Only one
//! acquisition may be `Requesting` at a time.

use serde::Serialize;

use crate::error::LocationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionState {
    #[default]
    Idle,
    Requesting,
    Succeeded,
    Denied,
    Unavailable,
    TimedOut,
    FallbackApplied,
    Failed,
}

impl AcquisitionState {
    /// True if a new acquisition can be started.
    pub fn can_start(self) -> bool {
        !matches!(self, Self::Requesting)
    }

    /// True while the UI should show a spinner.
    pub fn is_loading(self) -> bool {
        matches!(self, Self::Requesting)
    }

    /// State after the positioner failed with `error`.
    pub fn on_position_error(self, error: &LocationError) -> Self {
        match error {
            LocationError::PermissionDenied => Self::Denied,
            LocationError::Timeout(_) => Self::TimedOut,
            _ => Self::Unavailable,
        }
    }

    /// State after the fallback policy produced a snapshot.
    pub fn on_fallback(self) -> Self {
        match self {
            Self::Denied | Self::Unavailable | Self::TimedOut => Self::FallbackApplied,
            other => other,
        }
    }

    /// State after the acquisition ended in an error.
    pub fn on_failed(self) -> Self {
        Self::Failed
    }
}
