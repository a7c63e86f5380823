//! Reverse geocoding and nearby place search.
//!
//! Vendor APIs sit behind [`Geocoder`] and [`PlaceSearch`] so the service only
//! sees one async request/response shape. [`NominatimGeocoder`] covers
//! OpenStreetMap (free, no API key); the Amap adapter lives in `amap`.

use std::time::Duration;

use async_trait::async_trait;
use dietly_core::ReqwestErrorExt;
use reqwest::Client;
use serde::Deserialize;

use crate::error::LocationError;
use crate::types::{Address, Coordinates, NearbyPlace};

const USER_AGENT: &str = "Dietly/0.1.0 (https://github.com/dietly)";

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Address for a coordinate in the provider's datum.
    async fn reverse_geocode(&self, position: Coordinates) -> Result<Address, LocationError>;
}

#[async_trait]
pub trait PlaceSearch: Send + Sync {
    /// Places around `position`, in provider order.
    async fn search_nearby(
        &self,
        position: Coordinates,
        radius_meters: u32,
    ) -> Result<Vec<NearbyPlace>, LocationError>;
}

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    address: Option<NominatimAddress>,
    display_name: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
    city_district: Option<String>,
    suburb: Option<String>,
    county: Option<String>,
    state: Option<String>,
    road: Option<String>,
    house_number: Option<String>,
}

impl NominatimResponse {
    fn into_address(self) -> Address {
        let Some(addr) = self.address else {
            return Address {
                formatted_address: self.display_name,
                ..Default::default()
            };
        };

        Address {
            province: addr.state,
            city: addr.city.or(addr.town).or(addr.village).or(addr.municipality),
            district: addr.city_district.or(addr.suburb).or(addr.county),
            street: addr.road,
            street_number: addr.house_number,
            formatted_address: self.display_name,
        }
    }
}

/// OpenStreetMap reverse geocoder. Expects WGS84 coordinates.
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
}

impl NominatimGeocoder {
    /// # Errors
    /// Returns `LocationError::ConfigInvalid` if the HTTP client can't be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, LocationError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| LocationError::ConfigInvalid(format!("geocoding client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn reverse_geocode(&self, position: Coordinates) -> Result<Address, LocationError> {
        let url = format!("{}/reverse", self.base_url);
        let lat = position.lat.to_string();
        let lon = position.lng.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("format", "json"),
                ("addressdetails", "1"),
                ("zoom", "18"),
            ])
            .send()
            .await
            .map_err(|e| LocationError::GeocodeFailed(e.into_network_error().to_string()))?;

        if !response.status().is_success() {
            tracing::debug!("Reverse geocode returned status {}", response.status());
            return Err(LocationError::GeocodeFailed(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let body: NominatimResponse = response
            .json()
            .await
            .map_err(|e| LocationError::GeocodeFailed(format!("parse error: {}", e)))?;

        if let Some(error) = body.error {
            return Err(LocationError::GeocodeFailed(error));
        }

        let address = body.into_address();
        tracing::info!(
            "Reverse geocoded to: {}",
            address.locality().unwrap_or_default()
        );
        Ok(address)
    }
}
