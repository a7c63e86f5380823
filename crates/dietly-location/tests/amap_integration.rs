//! Integration tests for AmapClient using wiremock.

use std::time::Duration;

use dietly_location::amap::AmapError;
use dietly_location::retry::RetryConfig;
use dietly_location::{
    AmapClient, AmapIpPositioner, Coordinates, Geocoder, LocationError, LocationSource,
    PlaceSearch, PositionOptions, Positioner,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "test-key";

fn client(server: &MockServer) -> AmapClient {
    AmapClient::new(&server.uri(), KEY, Duration::from_secs(5), RetryConfig::none()).unwrap()
}

fn retrying_client(server: &MockServer) -> AmapClient {
    let retry = RetryConfig {
        max_retries: 2,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(20),
    };
    AmapClient::new(&server.uri(), KEY, Duration::from_secs(5), retry).unwrap()
}

fn options() -> PositionOptions {
    PositionOptions {
        enable_high_accuracy: true,
        timeout: Duration::from_secs(5),
        maximum_age: Duration::ZERO,
    }
}

#[tokio::test]
async fn test_regeocode_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/geocode/regeo"))
        .and(query_param("key", KEY))
        .and(query_param("location", "116.397428,39.909230"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "1",
            "info": "OK",
            "infocode": "10000",
            "regeocode": {
                "formatted_address": "北京市东城区东华门街道天安门",
                "addressComponent": {
                    "province": "北京市",
                    "city": [],
                    "district": "东城区",
                    "township": "东华门街道",
                    "streetNumber": {
                        "street": "东长安街",
                        "number": "1号"
                    }
                }
            }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let address = client(&mock_server)
        .reverse_geocode(Coordinates::new(116.397428, 39.90923))
        .await
        .unwrap();

    assert_eq!(address.province.as_deref(), Some("北京市"));
    assert!(address.city.is_none());
    assert_eq!(address.district.as_deref(), Some("东城区"));
    assert_eq!(address.street.as_deref(), Some("东长安街"));
    assert_eq!(address.street_number.as_deref(), Some("1号"));
    assert_eq!(
        address.formatted_address.as_deref(),
        Some("北京市东城区东华门街道天安门")
    );
}

#[tokio::test]
async fn test_regeocode_empty_fields() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/geocode/regeo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "1",
            "info": "OK",
            "infocode": "10000",
            "regeocode": {
                "formatted_address": [],
                "addressComponent": {
                    "province": [],
                    "city": [],
                    "district": [],
                    "streetNumber": []
                }
            }
        })))
        .mount(&mock_server)
        .await;

    let address = client(&mock_server)
        .reverse_geocode(Coordinates::new(100.0, 10.0))
        .await
        .unwrap();
    assert!(address.is_empty());
}

#[tokio::test]
async fn test_api_error_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/geocode/regeo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "0",
            "info": "INVALID_USER_KEY",
            "infocode": "10001"
        })))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server)
        .regeocode(Coordinates::new(116.4, 39.9))
        .await
        .unwrap_err();
    assert!(
        matches!(&err, AmapError::Api { info, infocode } if info == "INVALID_USER_KEY" && infocode == "10001")
    );

    let err = client(&mock_server)
        .reverse_geocode(Coordinates::new(116.4, 39.9))
        .await
        .unwrap_err();
    assert!(matches!(err, LocationError::GeocodeFailed(msg) if msg.contains("INVALID_USER_KEY")));
}

#[tokio::test]
async fn test_server_error_retried_then_succeeds() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/geocode/regeo"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v3/geocode/regeo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "1",
            "info": "OK",
            "infocode": "10000",
            "regeocode": {
                "formatted_address": "上海市黄浦区",
                "addressComponent": { "province": "上海市", "district": "黄浦区" }
            }
        })))
        .mount(&mock_server)
        .await;

    let address = retrying_client(&mock_server)
        .regeocode(Coordinates::new(121.47, 31.23))
        .await
        .unwrap();
    assert_eq!(address.district.as_deref(), Some("黄浦区"));
}

#[tokio::test]
async fn test_server_error_after_retries_exhausted() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/geocode/regeo"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let err = retrying_client(&mock_server)
        .regeocode(Coordinates::new(121.47, 31.23))
        .await
        .unwrap_err();
    assert!(matches!(err, AmapError::Network(_)));
}

#[tokio::test]
async fn test_client_error_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/geocode/regeo"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&mock_server)
        .await;

    assert!(retrying_client(&mock_server)
        .regeocode(Coordinates::new(121.47, 31.23))
        .await
        .is_err());
}

#[tokio::test]
async fn test_search_nearby() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/place/around"))
        .and(query_param("radius", "500"))
        .and(query_param("types", "050000"))
        .and(query_param("sortrule", "distance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "1",
            "info": "OK",
            "infocode": "10000",
            "count": "2",
            "pois": [
                {
                    "id": "B0FFFAB6J2",
                    "name": "庆丰包子铺",
                    "type": "餐饮服务;中餐厅;中餐厅",
                    "address": "前门大街",
                    "location": "116.398000,39.910000",
                    "distance": "86"
                },
                {
                    "id": "B000A83M61",
                    "name": "全聚德",
                    "type": "餐饮服务;中餐厅;特色/地方风味餐厅",
                    "address": [],
                    "location": "116.401000,39.912000",
                    "distance": "431"
                }
            ]
        })))
        .mount(&mock_server)
        .await;

    let places = client(&mock_server)
        .search_nearby(Coordinates::new(116.397428, 39.90923), 500)
        .await
        .unwrap();

    assert_eq!(places.len(), 2);
    assert_eq!(places[0].name, "庆丰包子铺");
    assert_eq!(places[0].category, "中餐厅");
    assert_eq!(places[0].distance_meters, 86);
    assert_eq!(places[1].address, "");
    assert_eq!(places[1].category, "特色/地方风味餐厅");
    assert_eq!(places[1].position, Some(Coordinates::new(116.401, 39.912)));
}

#[tokio::test]
async fn test_search_nearby_error_maps_to_place_search_failed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/place/around"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "0",
            "info": "DAILY_QUERY_OVER_LIMIT",
            "infocode": "10003"
        })))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server)
        .search_nearby(Coordinates::new(116.4, 39.9), 500)
        .await
        .unwrap_err();
    assert!(matches!(err, LocationError::PlaceSearchFailed(_)));
}

#[tokio::test]
async fn test_ip_positioner_uses_rectangle_center() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/ip"))
        .and(query_param("key", KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "1",
            "info": "OK",
            "infocode": "10000",
            "province": "北京市",
            "city": "北京市",
            "adcode": "110000",
            "rectangle": "116.0,39.5;117.0,40.5"
        })))
        .mount(&mock_server)
        .await;

    let positioner = AmapIpPositioner::new(client(&mock_server));
    let fix = positioner.current_position(options()).await.unwrap();

    assert_eq!(fix.position, Coordinates::new(116.5, 40.0));
    assert_eq!(fix.accuracy, 5000.0);
    assert_eq!(fix.source, LocationSource::IpAddress);
}

#[tokio::test]
async fn test_ip_positioner_foreign_ip_unavailable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/ip"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "1",
            "info": "OK",
            "infocode": "10000",
            "province": [],
            "city": [],
            "adcode": [],
            "rectangle": []
        })))
        .mount(&mock_server)
        .await;

    let positioner = AmapIpPositioner::new(client(&mock_server));
    let err = positioner.current_position(options()).await.unwrap_err();
    assert!(matches!(err, LocationError::PositionUnavailable(_)));
}
