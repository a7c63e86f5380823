//! Wire a [`LocationService`] from the app config.

use std::sync::Arc;
use std::time::Duration;

use dietly_core::Config;

use crate::amap::{AmapClient, AmapIpPositioner};
use crate::cache::{CacheKey, JsonFileCache};
use crate::error::LocationError;
use crate::geocode::NominatimGeocoder;
use crate::platform::SystemPositioner;
use crate::positioner::FallbackPositioner;
use crate::service::{LocationService, LocationServiceBuilder};
use crate::types::Coordinates;

/// Service for the configured map provider, caching under the config dir.
///
/// `amap`: system positioning shifted to GCJ-02 with Amap IP location as
/// backup, Amap reverse geocoding and nearby search.
/// `nominatim`: system positioning, OpenStreetMap reverse geocoding, no
/// nearby search.
///
/// # Errors
/// Returns `LocationError::ConfigInvalid` for an unknown provider or a
/// missing Amap key.
pub fn service_from_config(config: &Config) -> Result<LocationService, LocationError> {
    let builder = builder_for_provider(config)?
        .cache(Arc::new(JsonFileCache::new(config.cache_dir())))
        .cache_key(CacheKey::for_user(config.user.effective_user_id()));

    let builder = match config.location.fallback_center() {
        Some(center) => builder.default_center(Coordinates::new(center.longitude, center.latitude)),
        None => builder,
    };

    Ok(builder.build())
}

fn builder_for_provider(config: &Config) -> Result<LocationServiceBuilder, LocationError> {
    let provider = config.map.provider_name();
    tracing::debug!("Using map provider {}", provider);

    match provider.as_str() {
        "amap" => {
            let client = AmapClient::from_settings(&config.map)?;
            let positioner = FallbackPositioner::new(
                Arc::new(SystemPositioner::new().with_gcj02(true)),
                Arc::new(AmapIpPositioner::new(client.clone())),
            );
            let client = Arc::new(client);
            Ok(LocationService::builder(Arc::new(positioner))
                .geocoder(client.clone())
                .place_search(client))
        }
        "nominatim" => {
            let geocoder = NominatimGeocoder::new(
                &config.map.nominatim_url,
                Duration::from_secs(config.map.request_timeout_secs),
            )?;
            Ok(LocationService::builder(Arc::new(SystemPositioner::new()))
                .geocoder(Arc::new(geocoder)))
        }
        other => Err(LocationError::ConfigInvalid(format!(
            "unknown map provider '{}' (expected one of: {})",
            other,
            dietly_core::config::SUPPORTED_MAP_PROVIDERS.join(", ")
        ))),
    }
}
