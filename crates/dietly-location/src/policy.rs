//! What to hand back when positioning fails.

use crate::error::LocationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackDecision {
    /// Return the stored snapshot (fresh or not), marked degraded
    ServeCache,
    /// Return the configured default centre at city-level accuracy
    ServeDefault,
    /// Surface the positioning error
    Fail,
}

/// Decision table for a failed positioning attempt.
///
/// | failure                        | cached snapshot | default centre | decision     |
/// |--------------------------------|-----------------|----------------|--------------|
/// | denied / unavailable / timeout | yes             | any            | ServeCache   |
/// | denied / unavailable / timeout | no              | yes            | ServeDefault |
/// | denied / unavailable / timeout | no              | no             | Fail         |
/// | anything else                  | any             | any            | Fail         |
///
/// `cache_available` must already account for the request's cache toggle.
pub fn decide(
    failure: &LocationError,
    cache_available: bool,
    default_configured: bool,
) -> FallbackDecision {
    if !failure.is_acquisition_failure() {
        return FallbackDecision::Fail;
    }
    if cache_available {
        FallbackDecision::ServeCache
    } else if default_configured {
        FallbackDecision::ServeDefault
    } else {
        FallbackDecision::Fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn acquisition_failures() -> Vec<LocationError> {
        vec![
            LocationError::PermissionDenied,
            LocationError::PositionUnavailable("no fix".into()),
            LocationError::Timeout(Duration::from_secs(10)),
        ]
    }

    #[test]
    fn test_cache_wins_over_default() {
        for failure in acquisition_failures() {
            assert_eq!(decide(&failure, true, true), FallbackDecision::ServeCache);
            assert_eq!(decide(&failure, true, false), FallbackDecision::ServeCache);
        }
    }

    #[test]
    fn test_default_when_no_cache() {
        for failure in acquisition_failures() {
            assert_eq!(decide(&failure, false, true), FallbackDecision::ServeDefault);
        }
    }

    #[test]
    fn test_fail_when_nothing_to_serve() {
        for failure in acquisition_failures() {
            assert_eq!(decide(&failure, false, false), FallbackDecision::Fail);
        }
    }

    #[test]
    fn test_other_errors_never_fall_back() {
        let others = [
            LocationError::ConfigInvalid("radius".into()),
            LocationError::AlreadyInProgress,
            LocationError::Other("panic".into()),
        ];
        for failure in &others {
            assert_eq!(decide(failure, true, true), FallbackDecision::Fail);
        }
    }
}
