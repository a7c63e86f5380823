//! Amap (高德) web-service adapter.
//!
//! Every endpoint wraps its payload in a `status`/`info`/`infocode`
//! envelope, and fields with no value come back as `[]` instead of being
//! omitted. Coordinates are GCJ-02 in both directions.

use std::time::Duration;

use async_trait::async_trait;
use dietly_core::{MapSettings, NetworkError, ReqwestErrorExt};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::error::LocationError;
use crate::geocode::{Geocoder, PlaceSearch};
use crate::positioner::Positioner;
use crate::retry::{with_retry, RetryConfig};
use crate::types::{
    Address, Coordinates, LocationSource, NearbyPlace, PermissionState, PositionFix,
    PositionOptions, FALLBACK_ACCURACY_METERS,
};

/// Amap POI type code for food and beverage services.
pub const CATERING_POI_TYPES: &str = "050000";

const PAGE_SIZE: &str = "25";

#[derive(Debug, Error)]
pub enum AmapError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("Amap API error: {info} ({infocode})")]
    Api { info: String, infocode: String },

    #[error("Unexpected Amap response: {0}")]
    InvalidResponse(String),
}

/// `"foo"` → `Some("foo")`; `""`, `[]` and anything else → `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
        _ => None,
    })
}

/// A nested object, or `None` when Amap sent `[]` in its place.
fn lenient_object<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match serde_json::Value::deserialize(deserializer)? {
        value @ serde_json::Value::Object(_) => serde_json::from_value(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    info: String,
    #[serde(default)]
    infocode: String,
}

#[derive(Debug, Deserialize)]
struct RegeoResponse {
    regeocode: Regeocode,
}

#[derive(Debug, Deserialize)]
struct Regeocode {
    #[serde(default, deserialize_with = "lenient_string")]
    formatted_address: Option<String>,
    #[serde(rename = "addressComponent")]
    address_component: AddressComponent,
}

#[derive(Debug, Deserialize)]
struct AddressComponent {
    #[serde(default, deserialize_with = "lenient_string")]
    province: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    city: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    district: Option<String>,
    #[serde(rename = "streetNumber", default, deserialize_with = "lenient_object")]
    street_number: Option<StreetNumber>,
}

#[derive(Debug, Default, Deserialize)]
struct StreetNumber {
    #[serde(default, deserialize_with = "lenient_string")]
    street: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    number: Option<String>,
}

impl From<Regeocode> for Address {
    fn from(regeo: Regeocode) -> Self {
        let component = regeo.address_component;
        let street_number = component.street_number.unwrap_or_default();
        Address {
            province: component.province,
            city: component.city,
            district: component.district,
            street: street_number.street,
            street_number: street_number.number,
            formatted_address: regeo.formatted_address,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AroundResponse {
    #[serde(default)]
    pois: Vec<Poi>,
}

#[derive(Debug, Deserialize)]
struct Poi {
    id: String,
    name: String,
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    poi_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    address: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    location: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    distance: Option<String>,
}

impl From<Poi> for NearbyPlace {
    fn from(poi: Poi) -> Self {
        let distance_meters = poi
            .distance
            .and_then(|d| d.parse::<f64>().ok())
            .map_or(0, |d| d.round() as u32);
        NearbyPlace {
            id: poi.id,
            name: poi.name,
            // "餐饮服务;中餐厅;火锅店" → "火锅店"
            category: poi
                .poi_type
                .as_deref()
                .and_then(|t| t.rsplit(';').next())
                .unwrap_or_default()
                .to_string(),
            distance_meters,
            address: poi.address.unwrap_or_default(),
            position: poi.location.as_deref().and_then(Coordinates::parse),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IpResponse {
    #[serde(default, deserialize_with = "lenient_string")]
    city: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    rectangle: Option<String>,
}

/// Centre of an Amap rectangle, `"lng1,lat1;lng2,lat2"`.
fn rectangle_center(rectangle: &str) -> Option<Coordinates> {
    let (sw, ne) = rectangle.split_once(';')?;
    let sw = Coordinates::parse(sw)?;
    let ne = Coordinates::parse(ne)?;
    Some(Coordinates::new((sw.lng + ne.lng) / 2.0, (sw.lat + ne.lat) / 2.0))
}

#[derive(Debug, Clone)]
pub struct AmapClient {
    client: Client,
    base_url: String,
    api_key: String,
    retry: RetryConfig,
}

impl AmapClient {
    /// # Errors
    /// Returns `LocationError::ConfigInvalid` for an empty key or if the HTTP
    /// client can't be built.
    pub fn new(
        base_url: &str,
        api_key: &str,
        timeout: Duration,
        retry: RetryConfig,
    ) -> Result<Self, LocationError> {
        if api_key.trim().is_empty() {
            return Err(LocationError::ConfigInvalid(
                "Amap web API key is not configured".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LocationError::ConfigInvalid(format!("Amap client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            retry,
        })
    }

    /// Build from the `[map]` config section.
    ///
    /// # Errors
    /// Returns `LocationError::ConfigInvalid` when the key is missing or
    /// still the placeholder.
    pub fn from_settings(settings: &MapSettings) -> Result<Self, LocationError> {
        if !settings.has_amap_key() {
            return Err(LocationError::ConfigInvalid(
                "map.amap_web_api_key must be set to use the amap provider".to_string(),
            ));
        }
        Self::new(
            &settings.amap_base_url,
            &settings.amap_web_api_key,
            Duration::from_secs(settings.request_timeout_secs),
            RetryConfig::with_retries(settings.max_retries),
        )
    }

    async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T, AmapError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let mut query: Vec<(&str, &str)> = vec![("key", self.api_key.as_str())];
        query.extend_from_slice(params);

        tracing::debug!("Amap request {} {:?}", endpoint, params);

        let response = with_retry(&self.retry, || self.client.get(&url).query(&query).send())
            .await
            .map_err(|e| AmapError::Network(e.into_network_error()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AmapError::Network(NetworkError::ServerError {
                status: status.as_u16(),
                message,
            }));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AmapError::InvalidResponse(e.to_string()))?;

        let envelope = Envelope::deserialize(&body)
            .map_err(|e| AmapError::InvalidResponse(e.to_string()))?;
        if envelope.status != "1" {
            return Err(AmapError::Api {
                info: envelope.info,
                infocode: envelope.infocode,
            });
        }

        serde_json::from_value(body).map_err(|e| AmapError::InvalidResponse(e.to_string()))
    }

    /// Reverse geocode a GCJ-02 coordinate.
    pub async fn regeocode(&self, position: Coordinates) -> Result<Address, AmapError> {
        let location = position.to_query_value();
        let response: RegeoResponse = self
            .request("v3/geocode/regeo", &[("location", location.as_str())])
            .await?;
        Ok(response.regeocode.into())
    }

    /// POIs within `radius_meters`, nearest first.
    pub async fn search_around(
        &self,
        position: Coordinates,
        radius_meters: u32,
        types: &str,
    ) -> Result<Vec<NearbyPlace>, AmapError> {
        let location = position.to_query_value();
        let radius = radius_meters.to_string();
        let response: AroundResponse = self
            .request(
                "v3/place/around",
                &[
                    ("location", location.as_str()),
                    ("radius", radius.as_str()),
                    ("types", types),
                    ("sortrule", "distance"),
                    ("offset", PAGE_SIZE),
                    ("page", "1"),
                ],
            )
            .await?;
        Ok(response.pois.into_iter().map(NearbyPlace::from).collect())
    }

    /// Approximate position of the caller's public IP.
    pub async fn ip_locate(&self) -> Result<Coordinates, AmapError> {
        let response: IpResponse = self.request("v3/ip", &[]).await?;
        let rectangle = response.rectangle.ok_or_else(|| {
            AmapError::InvalidResponse("no rectangle for this IP (outside mainland China?)".into())
        })?;
        let center = rectangle_center(&rectangle)
            .ok_or_else(|| AmapError::InvalidResponse(format!("bad rectangle {:?}", rectangle)))?;

        tracing::info!(
            "IP located to {} ({})",
            response.city.as_deref().unwrap_or("unknown city"),
            center
        );
        Ok(center)
    }
}

#[async_trait]
impl Geocoder for AmapClient {
    async fn reverse_geocode(&self, position: Coordinates) -> Result<Address, LocationError> {
        self.regeocode(position)
            .await
            .map_err(|e| LocationError::GeocodeFailed(e.to_string()))
    }
}

#[async_trait]
impl PlaceSearch for AmapClient {
    async fn search_nearby(
        &self,
        position: Coordinates,
        radius_meters: u32,
    ) -> Result<Vec<NearbyPlace>, LocationError> {
        self.search_around(position, radius_meters, CATERING_POI_TYPES)
            .await
            .map_err(|e| LocationError::PlaceSearchFailed(e.to_string()))
    }
}

/// Positioner backed by Amap IP location.
#[derive(Debug, Clone)]
pub struct AmapIpPositioner {
    client: AmapClient,
}

impl AmapIpPositioner {
    pub fn new(client: AmapClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Positioner for AmapIpPositioner {
    async fn check_permission(&self) -> PermissionState {
        PermissionState::Granted
    }

    async fn current_position(
        &self,
        _options: PositionOptions,
    ) -> Result<PositionFix, LocationError> {
        let position = self
            .client
            .ip_locate()
            .await
            .map_err(|e| LocationError::PositionUnavailable(e.to_string()))?;
        Ok(PositionFix {
            position,
            accuracy: FALLBACK_ACCURACY_METERS,
            source: LocationSource::IpAddress,
        })
    }
}
