//! Device positioning.
//!
//! A [`Positioner`] turns "where am I" into a [`PositionFix`]. The platform
//! implementation lives in `platform`; `amap` provides an IP-based one.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::LocationError;
use crate::types::{PermissionState, PositionFix, PositionOptions};

#[async_trait]
pub trait Positioner: Send + Sync {
    /// Current permission state without prompting.
    ///
    /// Platforms with no query capability report `Unknown`.
    async fn check_permission(&self) -> PermissionState {
        PermissionState::Unknown
    }

    /// One position fix.
    ///
    /// Implementations report denial as `PermissionDenied` and anything else
    /// that prevents a fix as `PositionUnavailable`. The caller enforces
    /// `options.timeout`.
    async fn current_position(&self, options: PositionOptions)
        -> Result<PositionFix, LocationError>;
}

/// Tries `primary`, then `secondary` when the primary has no fix to give.
///
/// The primary gets half of `options.timeout`; running past that counts as
/// having no fix and the secondary gets the rest. Denial from the primary is
/// returned unchanged.
pub struct FallbackPositioner {
    primary: Arc<dyn Positioner>,
    secondary: Arc<dyn Positioner>,
}

impl FallbackPositioner {
    pub fn new(primary: Arc<dyn Positioner>, secondary: Arc<dyn Positioner>) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl Positioner for FallbackPositioner {
    async fn check_permission(&self) -> PermissionState {
        self.primary.check_permission().await
    }

    async fn current_position(
        &self,
        options: PositionOptions,
    ) -> Result<PositionFix, LocationError> {
        let budget = options.timeout / 2;
        match tokio::time::timeout(budget, self.primary.current_position(options)).await {
            Ok(Err(LocationError::PositionUnavailable(reason))) => {
                tracing::info!("Primary positioner unavailable ({}), trying fallback", reason);
            }
            Err(_) => {
                tracing::info!("Primary positioner gave no fix within {:?}, trying fallback", budget);
            }
            Ok(other) => return other,
        }

        let remaining = PositionOptions {
            timeout: options.timeout.saturating_sub(budget),
            ..options
        };
        self.secondary.current_position(remaining).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::types::{Coordinates, LocationSource};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Scripted {
        result: fn() -> Result<PositionFix, LocationError>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(result: fn() -> Result<PositionFix, LocationError>) -> Arc<Self> {
            Arc::new(Self {
                result,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Positioner for Scripted {
        async fn check_permission(&self) -> PermissionState {
            PermissionState::Granted
        }

        async fn current_position(
            &self,
            _options: PositionOptions,
        ) -> Result<PositionFix, LocationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.result)()
        }
    }

    fn ip_fix() -> Result<PositionFix, LocationError> {
        Ok(PositionFix {
            position: Coordinates::new(116.39, 39.91),
            accuracy: 5000.0,
            source: LocationSource::IpAddress,
        })
    }

    fn options() -> PositionOptions {
        PositionOptions {
            enable_high_accuracy: true,
            timeout: Duration::from_secs(1),
            maximum_age: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_unavailable_falls_through() {
        let primary = Scripted::new(|| Err(LocationError::PositionUnavailable("no geoclue".into())));
        let secondary = Scripted::new(ip_fix);
        let positioner = FallbackPositioner::new(primary.clone(), secondary.clone());

        let fix = positioner.current_position(options()).await.unwrap();
        assert_eq!(fix.source, LocationSource::IpAddress);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_denial_is_not_masked() {
        let primary = Scripted::new(|| Err(LocationError::PermissionDenied));
        let secondary = Scripted::new(ip_fix);
        let positioner = FallbackPositioner::new(primary, secondary.clone());

        let err = positioner.current_position(options()).await.unwrap_err();
        assert!(matches!(err, LocationError::PermissionDenied));
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 0);
    }

    struct Hanging;

    #[async_trait]
    impl Positioner for Hanging {
        async fn current_position(
            &self,
            _options: PositionOptions,
        ) -> Result<PositionFix, LocationError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_hanging_primary_falls_through_within_deadline() {
        let secondary = Scripted::new(ip_fix);
        let positioner = FallbackPositioner::new(Arc::new(Hanging), secondary.clone());

        let fix = tokio::time::timeout(Duration::from_secs(1), positioner.current_position(options()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fix.source, LocationSource::IpAddress);
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_primary_fix_skips_secondary() {
        let primary = Scripted::new(|| {
            Ok(PositionFix {
                position: Coordinates::new(116.39, 39.91),
                accuracy: 15.0,
                source: LocationSource::Gps,
            })
        });
        let secondary = Scripted::new(ip_fix);
        let positioner = FallbackPositioner::new(primary, secondary.clone());

        let fix = positioner.current_position(options()).await.unwrap();
        assert_eq!(fix.source, LocationSource::Gps);
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_permission_comes_from_primary() {
        let positioner = FallbackPositioner::new(Scripted::new(ip_fix), Scripted::new(ip_fix));
        assert_eq!(positioner.check_permission().await, PermissionState::Granted);
    }
}
