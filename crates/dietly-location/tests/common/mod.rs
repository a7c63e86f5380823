//! Test doubles shared by the integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use dietly_location::{
    Address, Coordinates, Geocoder, LocationError, LocationSource, NearbyPlace, PermissionState,
    PlaceSearch, PositionFix, PositionOptions, Positioner,
};

pub const BEIJING: Coordinates = Coordinates {
    lng: 116.397428,
    lat: 39.90923,
};

pub fn beijing_fix() -> PositionFix {
    PositionFix {
        position: BEIJING,
        accuracy: 15.0,
        source: LocationSource::Gps,
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Fix(PositionFix),
    Denied,
    Unavailable,
    /// Never resolves
    Hang,
}

pub struct FakePositioner {
    calls: AtomicUsize,
    permission: Mutex<PermissionState>,
    outcome: Mutex<Outcome>,
    delay: Duration,
}

impl FakePositioner {
    pub fn new(outcome: Outcome) -> Arc<Self> {
        Self::slow(outcome, Duration::ZERO)
    }

    pub fn fixed() -> Arc<Self> {
        Self::new(Outcome::Fix(beijing_fix()))
    }

    pub fn slow(outcome: Outcome, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            permission: Mutex::new(PermissionState::Granted),
            outcome: Mutex::new(outcome),
            delay,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_permission(&self, permission: PermissionState) {
        *self.permission.lock() = permission;
    }

    pub fn set_outcome(&self, outcome: Outcome) {
        *self.outcome.lock() = outcome;
    }
}

#[async_trait]
impl Positioner for FakePositioner {
    async fn check_permission(&self) -> PermissionState {
        *self.permission.lock()
    }

    async fn current_position(
        &self,
        _options: PositionOptions,
    ) -> Result<PositionFix, LocationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let outcome = *self.outcome.lock();
        match outcome {
            Outcome::Fix(fix) => Ok(fix),
            Outcome::Denied => Err(LocationError::PermissionDenied),
            Outcome::Unavailable => Err(LocationError::PositionUnavailable("no signal".into())),
            Outcome::Hang => std::future::pending().await,
        }
    }
}

pub struct FakeGeocoder {
    fail: bool,
    calls: AtomicUsize,
}

impl FakeGeocoder {
    pub fn working() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Geocoder for FakeGeocoder {
    async fn reverse_geocode(&self, _position: Coordinates) -> Result<Address, LocationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(LocationError::GeocodeFailed("service down".into()));
        }
        Ok(Address {
            province: Some("北京市".into()),
            district: Some("东城区".into()),
            formatted_address: Some("北京市东城区东华门街道天安门".into()),
            ..Default::default()
        })
    }
}

pub fn place(id: &str, distance_meters: u32) -> NearbyPlace {
    NearbyPlace {
        id: id.into(),
        name: format!("Restaurant {}", id),
        category: "中餐厅".into(),
        distance_meters,
        address: String::new(),
        position: None,
    }
}

pub struct FakePlaces {
    places: Option<Vec<NearbyPlace>>,
    calls: AtomicUsize,
}

impl FakePlaces {
    pub fn returning(places: Vec<NearbyPlace>) -> Arc<Self> {
        Arc::new(Self {
            places: Some(places),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            places: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlaceSearch for FakePlaces {
    async fn search_nearby(
        &self,
        _position: Coordinates,
        _radius_meters: u32,
    ) -> Result<Vec<NearbyPlace>, LocationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.places
            .clone()
            .ok_or_else(|| LocationError::PlaceSearchFailed("quota exceeded".into()))
    }
}
