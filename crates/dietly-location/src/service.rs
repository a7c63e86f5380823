//! Location acquisition with caching and graceful degradation.
//!
//! A request is served from the cache slot while the stored snapshot is
//! fresh. Otherwise one acquisition runs on its own tokio task: permission
//! check, positioning under a deadline, reverse geocoding, optional nearby
//! search, then the cache write. Positioning failures go through
//! [`policy::decide`](crate::policy::decide).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::{CacheKey, LocationCache, MemoryLocationCache};
use crate::clock::{Clock, SystemClock};
use crate::error::LocationError;
use crate::geo;
use crate::geocode::{Geocoder, PlaceSearch};
use crate::policy::{self, FallbackDecision};
use crate::positioner::Positioner;
use crate::state::AcquisitionState;
use crate::types::{
    Address, Coordinates, LocationRequest, LocationSnapshot, LocationSource, NearbyPlace,
    PermissionState, PositionFix, FALLBACK_ACCURACY_METERS,
};

struct Inner {
    positioner: Arc<dyn Positioner>,
    geocoder: Option<Arc<dyn Geocoder>>,
    place_search: Option<Arc<dyn PlaceSearch>>,
    cache: Arc<dyn LocationCache>,
    clock: Arc<dyn Clock>,
    cache_key: CacheKey,
    default_center: Option<Coordinates>,
    in_flight: AtomicBool,
    state: Mutex<AcquisitionState>,
}

/// Releases the single-flight slot when the acquisition task ends, even if
/// it panicked.
struct InFlightGuard {
    inner: Arc<Inner>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        {
            let mut state = self.inner.state.lock();
            if state.is_loading() {
                *state = state.on_failed();
            }
        }
        self.inner.in_flight.store(false, Ordering::Release);
    }
}

/// Shared handle to the location service. Clones share cache slot, guard
/// and state.
#[derive(Clone)]
pub struct LocationService {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for LocationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationService")
            .field("cache_key", &self.inner.cache_key)
            .field("default_center", &self.inner.default_center)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

pub struct LocationServiceBuilder {
    positioner: Arc<dyn Positioner>,
    geocoder: Option<Arc<dyn Geocoder>>,
    place_search: Option<Arc<dyn PlaceSearch>>,
    cache: Option<Arc<dyn LocationCache>>,
    clock: Option<Arc<dyn Clock>>,
    cache_key: CacheKey,
    default_center: Option<Coordinates>,
}

impl LocationServiceBuilder {
    pub fn geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub fn place_search(mut self, place_search: Arc<dyn PlaceSearch>) -> Self {
        self.place_search = Some(place_search);
        self
    }

    /// Defaults to an in-memory cache.
    pub fn cache(mut self, cache: Arc<dyn LocationCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn cache_key(mut self, key: CacheKey) -> Self {
        self.cache_key = key;
        self
    }

    /// Position served when positioning fails and nothing is cached.
    pub fn default_center(mut self, center: Coordinates) -> Self {
        self.default_center = Some(center);
        self
    }

    pub fn build(self) -> LocationService {
        LocationService {
            inner: Arc::new(Inner {
                positioner: self.positioner,
                geocoder: self.geocoder,
                place_search: self.place_search,
                cache: self
                    .cache
                    .unwrap_or_else(|| Arc::new(MemoryLocationCache::new())),
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
                cache_key: self.cache_key,
                default_center: self.default_center,
                in_flight: AtomicBool::new(false),
                state: Mutex::new(AcquisitionState::Idle),
            }),
        }
    }
}

impl LocationService {
    pub fn builder(positioner: Arc<dyn Positioner>) -> LocationServiceBuilder {
        LocationServiceBuilder {
            positioner,
            geocoder: None,
            place_search: None,
            cache: None,
            clock: None,
            cache_key: CacheKey::default(),
            default_center: None,
        }
    }

    /// Current location, from the cache when a fresh snapshot is stored.
    ///
    /// # Errors
    /// `ConfigInvalid` for unusable settings (before any I/O),
    /// `AlreadyInProgress` while another acquisition runs, and the
    /// positioning error when the fallback policy has nothing to serve.
    pub async fn request_location(
        &self,
        request: &LocationRequest,
    ) -> Result<LocationSnapshot, LocationError> {
        request.validate()?;

        if request.enable_cache {
            let now = self.inner.clock.now();
            if let Some(snapshot) = self
                .inner
                .read_cache()
                .filter(|s| s.is_fresh(now, request.cache_expiry()))
            {
                tracing::info!(
                    "Serving cached location from {} ({})",
                    snapshot.captured_at,
                    snapshot.source.description()
                );
                return Ok(snapshot);
            }
        }

        self.acquire(request, false).await
    }

    /// Drop the cached snapshot and locate again. The result is always cached.
    ///
    /// # Errors
    /// Same as [`request_location`](Self::request_location).
    pub async fn refresh_location(
        &self,
        request: &LocationRequest,
    ) -> Result<LocationSnapshot, LocationError> {
        request.validate()?;
        self.acquire(request, true).await
    }

    /// Evict this user's snapshot. Storage errors are logged.
    pub fn clear_cache(&self) {
        self.inner.clear_cache();
    }

    /// Platform permission state; never prompts.
    pub async fn check_permission(&self) -> PermissionState {
        self.inner.positioner.check_permission().await
    }

    /// Last observed acquisition state.
    pub fn state(&self) -> AcquisitionState {
        *self.inner.state.lock()
    }

    pub fn cache_key(&self) -> &CacheKey {
        &self.inner.cache_key
    }

    async fn acquire(
        &self,
        request: &LocationRequest,
        refresh: bool,
    ) -> Result<LocationSnapshot, LocationError> {
        let guard = self
            .inner
            .try_begin()
            .ok_or(LocationError::AlreadyInProgress)?;
        let inner = Arc::clone(&self.inner);
        let request = request.clone();

        // Detached: dropping the caller's future doesn't stop the task, so
        // the result still lands in the cache.
        let task = tokio::spawn(async move {
            let _guard = guard;
            inner.run(&request, refresh).await
        });

        task.await
            .map_err(|e| LocationError::Other(format!("location task failed: {}", e)))?
    }
}

impl Inner {
    fn try_begin(self: &Arc<Self>) -> Option<InFlightGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()?;
        self.set_state(AcquisitionState::Requesting);
        Some(InFlightGuard {
            inner: Arc::clone(self),
        })
    }

    fn set_state(&self, state: AcquisitionState) {
        *self.state.lock() = state;
    }

    fn update_state(&self, f: impl FnOnce(AcquisitionState) -> AcquisitionState) {
        let mut state = self.state.lock();
        *state = f(*state);
    }

    /// Stored snapshot regardless of age. Unreadable entries are evicted.
    fn read_cache(&self) -> Option<LocationSnapshot> {
        match self.cache.get(&self.cache_key) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Discarding unreadable cached location: {:#}", e);
                self.clear_cache();
                None
            }
        }
    }

    fn write_cache(&self, snapshot: &LocationSnapshot) {
        if let Err(e) = self.cache.set(&self.cache_key, snapshot) {
            tracing::warn!("Failed to cache location: {:#}", e);
        }
    }

    fn clear_cache(&self) {
        match self.cache.clear(&self.cache_key) {
            Ok(()) => tracing::debug!("Cleared cached location {}", self.cache_key.as_str()),
            Err(e) => tracing::warn!("Failed to clear cached location: {:#}", e),
        }
    }

    async fn run(
        &self,
        request: &LocationRequest,
        refresh: bool,
    ) -> Result<LocationSnapshot, LocationError> {
        if refresh {
            self.clear_cache();
        }

        match self.locate(request).await {
            Ok(fix) => {
                let snapshot = self.snapshot_from_fix(fix, request).await;
                if refresh || request.enable_cache {
                    self.write_cache(&snapshot);
                }
                self.set_state(AcquisitionState::Succeeded);
                tracing::info!(
                    "Located {} ±{:.0} m via {}",
                    snapshot.position,
                    snapshot.accuracy,
                    snapshot.source.description()
                );
                Ok(snapshot)
            }
            Err(error) => {
                self.update_state(|s| s.on_position_error(&error));
                tracing::warn!("Positioning failed: {}", error);
                self.fall_back(error, request).await
            }
        }
    }

    async fn locate(&self, request: &LocationRequest) -> Result<PositionFix, LocationError> {
        let permission = self.positioner.check_permission().await;
        tracing::debug!("Location permission: {:?}", permission);
        if permission == PermissionState::Denied {
            return Err(LocationError::PermissionDenied);
        }

        let timeout = request.timeout();
        let fix = tokio::time::timeout(
            timeout,
            self.positioner.current_position(request.position_options()),
        )
        .await
        .map_err(|_| LocationError::Timeout(timeout))??;

        if !fix.position.is_valid() {
            return Err(LocationError::PositionUnavailable(format!(
                "positioner returned out-of-range coordinates {}",
                fix.position
            )));
        }
        Ok(fix)
    }

    async fn fall_back(
        &self,
        error: LocationError,
        request: &LocationRequest,
    ) -> Result<LocationSnapshot, LocationError> {
        let cached = if request.enable_cache {
            self.read_cache()
        } else {
            None
        };
        let decision = policy::decide(&error, cached.is_some(), self.default_center.is_some());

        match (decision, cached, self.default_center) {
            (FallbackDecision::ServeCache, Some(snapshot), _) => {
                tracing::info!("Serving last known location from {}", snapshot.captured_at);
                self.update_state(AcquisitionState::on_fallback);
                Ok(snapshot.degraded())
            }
            (FallbackDecision::ServeDefault, _, Some(center)) => {
                tracing::info!("Serving default location {}", center);
                let nearby_places = if request.fetch_nearby_places {
                    self.nearby_places(center, request.place_search_radius_meters)
                        .await
                } else {
                    None
                };
                let snapshot = LocationSnapshot {
                    position: center,
                    address: self.reverse_geocode(center).await,
                    accuracy: FALLBACK_ACCURACY_METERS,
                    source: LocationSource::IpAddress,
                    captured_at: self.clock.now(),
                    nearby_places,
                };
                self.update_state(AcquisitionState::on_fallback);
                Ok(snapshot)
            }
            _ => {
                self.update_state(AcquisitionState::on_failed);
                Err(error)
            }
        }
    }

    async fn snapshot_from_fix(&self, fix: PositionFix, request: &LocationRequest) -> LocationSnapshot {
        let address = self.reverse_geocode(fix.position).await;
        let nearby_places = if request.fetch_nearby_places {
            self.nearby_places(fix.position, request.place_search_radius_meters)
                .await
        } else {
            None
        };

        LocationSnapshot {
            position: fix.position,
            address,
            accuracy: fix.accuracy,
            source: fix.source,
            captured_at: self.clock.now(),
            nearby_places,
        }
    }

    async fn reverse_geocode(&self, position: Coordinates) -> Address {
        let Some(geocoder) = &self.geocoder else {
            return Address::default();
        };
        match geocoder.reverse_geocode(position).await {
            Ok(address) => address,
            Err(e) => {
                tracing::warn!("{}", e);
                Address::default()
            }
        }
    }

    async fn nearby_places(&self, position: Coordinates, radius: u32) -> Option<Vec<NearbyPlace>> {
        let Some(search) = &self.place_search else {
            tracing::debug!("No place search configured; skipping nearby places");
            return None;
        };
        match search.search_nearby(position, radius).await {
            Ok(places) => {
                let places = geo::within_radius(position, places, radius);
                (!places.is_empty()).then_some(places)
            }
            Err(e) => {
                tracing::warn!("{}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::types::PositionOptions;
    use async_trait::async_trait;

    struct Fixed;

    #[async_trait]
    impl Positioner for Fixed {
        async fn current_position(
            &self,
            _options: PositionOptions,
        ) -> Result<PositionFix, LocationError> {
            Ok(PositionFix {
                position: Coordinates::new(500.0, 0.0),
                accuracy: 10.0,
                source: LocationSource::Gps,
            })
        }
    }

    #[tokio::test]
    async fn test_out_of_range_fix_is_unavailable() {
        let service = LocationService::builder(Arc::new(Fixed)).build();
        let err = service
            .request_location(&LocationRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LocationError::PositionUnavailable(_)));
        assert_eq!(service.state(), AcquisitionState::Failed);
    }

    #[test]
    fn test_guard_releases_slot() {
        let service = LocationService::builder(Arc::new(Fixed)).build();
        let guard = service.inner.try_begin().unwrap();
        assert!(service.inner.try_begin().is_none());
        assert_eq!(service.state(), AcquisitionState::Requesting);

        drop(guard);
        assert!(service.inner.try_begin().is_some());
    }

    #[test]
    fn test_dropped_guard_marks_failed_if_still_requesting() {
        let service = LocationService::builder(Arc::new(Fixed)).build();
        drop(service.inner.try_begin().unwrap());
        assert_eq!(service.state(), AcquisitionState::Failed);
    }
}
