//! OS positioning services.
//!
//! Linux asks GeoClue2 over the system bus, Windows asks
//! `Windows.Devices.Geolocation`. Other targets have no fix to give.

use async_trait::async_trait;

use crate::error::LocationError;
use crate::geo::wgs84_to_gcj02;
use crate::positioner::Positioner;
use crate::types::{PositionFix, PositionOptions};

/// Positioner backed by the operating system's location service.
#[derive(Debug, Clone, Default)]
pub struct SystemPositioner {
    gcj02: bool,
}

impl SystemPositioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shift fixes inside mainland China to GCJ-02 so they line up with
    /// Amap data.
    pub fn with_gcj02(mut self, enabled: bool) -> Self {
        self.gcj02 = enabled;
        self
    }

    fn finish(&self, mut fix: PositionFix) -> PositionFix {
        if self.gcj02 {
            fix.position = wgs84_to_gcj02(fix.position);
        }
        tracing::debug!(
            "System fix {} ±{:.0} m via {}",
            fix.position,
            fix.accuracy,
            fix.source.description()
        );
        fix
    }
}

#[async_trait]
impl Positioner for SystemPositioner {
    async fn current_position(
        &self,
        options: PositionOptions,
    ) -> Result<PositionFix, LocationError> {
        let fix = imp::current_position(options).await?;
        Ok(self.finish(fix))
    }
}

#[cfg(target_os = "linux")]
mod imp {
    use std::time::Duration;

    use zbus::zvariant::OwnedObjectPath;
    use zbus::proxy::CacheProperties;
    use zbus::Connection;

    use crate::error::LocationError;
    use crate::types::{Coordinates, LocationSource, PositionFix, PositionOptions};

    const DESKTOP_ID: &str = "dietly";
    const ACCURACY_CITY: u32 = 4;
    const ACCURACY_EXACT: u32 = 8;
    const POLL_INTERVAL: Duration = Duration::from_millis(200);

    #[zbus::proxy(
        interface = "org.freedesktop.GeoClue2.Manager",
        default_service = "org.freedesktop.GeoClue2",
        default_path = "/org/freedesktop/GeoClue2/Manager"
    )]
    trait Manager {
        fn get_client(&self) -> zbus::Result<OwnedObjectPath>;

        fn delete_client(&self, client: &zbus::zvariant::ObjectPath<'_>) -> zbus::Result<()>;
    }

    #[zbus::proxy(
        interface = "org.freedesktop.GeoClue2.Client",
        default_service = "org.freedesktop.GeoClue2"
    )]
    trait Client {
        fn start(&self) -> zbus::Result<()>;

        fn stop(&self) -> zbus::Result<()>;

        #[zbus(property)]
        fn location(&self) -> zbus::Result<OwnedObjectPath>;

        #[zbus(property)]
        fn set_desktop_id(&self, id: &str) -> zbus::Result<()>;

        #[zbus(property)]
        fn set_requested_accuracy_level(&self, level: u32) -> zbus::Result<()>;
    }

    #[zbus::proxy(
        interface = "org.freedesktop.GeoClue2.Location",
        default_service = "org.freedesktop.GeoClue2"
    )]
    trait Location {
        #[zbus(property)]
        fn latitude(&self) -> zbus::Result<f64>;

        #[zbus(property)]
        fn longitude(&self) -> zbus::Result<f64>;

        #[zbus(property)]
        fn accuracy(&self) -> zbus::Result<f64>;
    }

    fn classify(e: zbus::Error) -> LocationError {
        let denied = match &e {
            zbus::Error::MethodError(name, _, _) => name.as_str().ends_with("AccessDenied"),
            zbus::Error::FDO(fdo) => matches!(**fdo, zbus::fdo::Error::AccessDenied(_)),
            _ => false,
        };
        if denied {
            LocationError::PermissionDenied
        } else {
            LocationError::PositionUnavailable(format!("GeoClue: {}", e))
        }
    }

    pub(super) async fn current_position(
        options: PositionOptions,
    ) -> Result<PositionFix, LocationError> {
        let conn = Connection::system().await.map_err(classify)?;
        let manager = ManagerProxy::new(&conn).await.map_err(classify)?;
        let client_path = manager.get_client().await.map_err(classify)?;

        let result = run_client(&conn, &client_path, options).await;

        if let Err(e) = manager.delete_client(&client_path).await {
            tracing::debug!("Failed to release GeoClue client: {}", e);
        }
        result
    }

    async fn run_client(
        conn: &Connection,
        client_path: &OwnedObjectPath,
        options: PositionOptions,
    ) -> Result<PositionFix, LocationError> {
        let client = ClientProxy::builder(conn)
            .path(client_path.clone().into_inner())
            .map_err(classify)?
            .cache_properties(CacheProperties::No)
            .build()
            .await
            .map_err(classify)?;

        client.set_desktop_id(DESKTOP_ID).await.map_err(classify)?;
        let level = if options.enable_high_accuracy {
            ACCURACY_EXACT
        } else {
            ACCURACY_CITY
        };
        client
            .set_requested_accuracy_level(level)
            .await
            .map_err(classify)?;
        client.start().await.map_err(classify)?;

        let fix = wait_for_location(conn, &client).await;
        if let Err(e) = client.stop().await {
            tracing::debug!("Failed to stop GeoClue client: {}", e);
        }
        fix
    }

    /// GeoClue reports "/" until the first fix arrives.
    async fn wait_for_location(
        conn: &Connection,
        client: &ClientProxy<'_>,
    ) -> Result<PositionFix, LocationError> {
        loop {
            let path = client.location().await.map_err(classify)?;
            if path.as_str() != "/" {
                let location = LocationProxy::builder(conn)
                    .path(path.into_inner())
                    .map_err(classify)?
                    .cache_properties(CacheProperties::No)
                    .build()
                    .await
                    .map_err(classify)?;

                let position = Coordinates::new(
                    location.longitude().await.map_err(classify)?,
                    location.latitude().await.map_err(classify)?,
                );
                let accuracy = location.accuracy().await.map_err(classify)?;
                return Ok(PositionFix {
                    position,
                    accuracy,
                    source: LocationSource::from_accuracy(accuracy),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[cfg(windows)]
mod imp {
    use windows::core::HRESULT;
    use windows::Devices::Geolocation::{
        GeolocationAccessStatus, Geolocator, PositionAccuracy, PositionSource,
    };

    use crate::error::LocationError;
    use crate::types::{Coordinates, LocationSource, PositionFix, PositionOptions};

    const E_ACCESSDENIED: HRESULT = HRESULT(0x8007_0005_u32 as i32);

    fn classify(e: windows::core::Error) -> LocationError {
        if e.code() == E_ACCESSDENIED {
            LocationError::PermissionDenied
        } else {
            LocationError::PositionUnavailable(format!("Geolocator: {}", e))
        }
    }

    fn map_source(source: PositionSource, accuracy: f64) -> LocationSource {
        match source {
            PositionSource::Satellite => LocationSource::Gps,
            PositionSource::WiFi => LocationSource::NetworkWifi,
            PositionSource::Cellular => LocationSource::CellTower,
            PositionSource::IPAddress => LocationSource::IpAddress,
            _ => LocationSource::from_accuracy(accuracy),
        }
    }

    fn locate(high_accuracy: bool) -> Result<PositionFix, LocationError> {
        let access = Geolocator::RequestAccessAsync()
            .and_then(|op| op.get())
            .map_err(classify)?;
        if access != GeolocationAccessStatus::Allowed {
            return Err(LocationError::PermissionDenied);
        }

        let locator = Geolocator::new().map_err(classify)?;
        let accuracy = if high_accuracy {
            PositionAccuracy::High
        } else {
            PositionAccuracy::Default
        };
        locator.SetDesiredAccuracy(accuracy).map_err(classify)?;

        let coordinate = locator
            .GetGeopositionAsync()
            .and_then(|op| op.get())
            .and_then(|pos| pos.Coordinate())
            .map_err(classify)?;
        let point = coordinate
            .Point()
            .and_then(|p| p.Position())
            .map_err(classify)?;
        let accuracy = coordinate.Accuracy().map_err(classify)?;
        let source = coordinate
            .PositionSource()
            .map_or_else(|_| LocationSource::from_accuracy(accuracy), |s| map_source(s, accuracy));

        Ok(PositionFix {
            position: Coordinates::new(point.Longitude, point.Latitude),
            accuracy,
            source,
        })
    }

    pub(super) async fn current_position(
        options: PositionOptions,
    ) -> Result<PositionFix, LocationError> {
        let high_accuracy = options.enable_high_accuracy;
        tokio::task::spawn_blocking(move || locate(high_accuracy))
            .await
            .map_err(|e| LocationError::Other(format!("geolocation task failed: {}", e)))?
    }
}

#[cfg(not(any(target_os = "linux", windows)))]
mod imp {
    use crate::error::LocationError;
    use crate::types::{PositionFix, PositionOptions};

    pub(super) async fn current_position(
        _options: PositionOptions,
    ) -> Result<PositionFix, LocationError> {
        Err(LocationError::PositionUnavailable(
            "no system location service on this platform".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Coordinates, LocationSource};

    fn fix_in_beijing() -> PositionFix {
        PositionFix {
            position: Coordinates::new(116.397428, 39.90923),
            accuracy: 20.0,
            source: LocationSource::Gps,
        }
    }

    #[test]
    fn test_gcj02_shift_is_opt_in() {
        let plain = SystemPositioner::new().finish(fix_in_beijing());
        assert_eq!(plain.position, fix_in_beijing().position);

        let shifted = SystemPositioner::new()
            .with_gcj02(true)
            .finish(fix_in_beijing());
        assert_ne!(shifted.position, fix_in_beijing().position);
        assert_eq!(shifted.accuracy, 20.0);
    }

    #[tokio::test]
    async fn test_permission_is_unknown() {
        assert_eq!(
            SystemPositioner::new().check_permission().await,
            crate::types::PermissionState::Unknown
        );
    }
}
