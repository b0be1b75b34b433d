use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rrchirp_common::UsState;
use rrchirp_harvester::module::cache::VerificationOutcome;
use rrchirp_harvester::module::http::UpstreamHttp;
use rrchirp_harvester::module::rate_limit::RateLimiter;
use rrchirp_harvester::module::resolver::{Geocoder, NominatimGeocoder, RemoteZipApi, ZipLookup};
use rrchirp_harvester::{HarvestConfig, HarvestError};

fn http() -> UpstreamHttp {
    let config = HarvestConfig::default();
    UpstreamHttp::new(&config, Arc::new(RateLimiter::new(Duration::from_millis(1)))).unwrap()
}

#[tokio::test]
async fn test_zip_api_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/us/90210"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "post code": "90210",
            "country": "United States",
            "places": [{
                "place name": "Beverly Hills",
                "longitude": "-118.4065",
                "state": "California",
                "state abbreviation": "CA",
                "latitude": "34.0901"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = RemoteZipApi::new(server.uri(), http());
    let place = api.lookup("90210").await.unwrap();
    assert_eq!(place.city, "Beverly Hills");
    assert_eq!(place.state, UsState::CA);
    assert_eq!(place.county, None);
    assert_eq!(place.latitude, Some(34.0901));
    assert_eq!(place.longitude, Some(-118.4065));
}

#[tokio::test]
async fn test_zip_api_unknown_zip() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/us/00000"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({})))
        .mount(&server)
        .await;

    let api = RemoteZipApi::new(server.uri(), http());
    let err = api.lookup("00000").await.unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {err}");
}

#[tokio::test]
async fn test_zip_api_outage_is_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let api = RemoteZipApi::new(server.uri(), http());
    let err = api.lookup("90210").await.unwrap_err();
    assert!(matches!(err, HarvestError::Network { .. }), "unexpected error: {err}");
}

#[tokio::test]
async fn test_reverse_geocode_county() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/reverse"))
        .and(query_param("zoom", "10"))
        .and(query_param("lat", "34.0901"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "display_name": "Los Angeles County, California, United States",
            "address": {
                "county": "Los Angeles County",
                "state": "California",
                "ISO3166-2-lvl4": "US-CA",
                "country_code": "us"
            }
        })))
        .mount(&server)
        .await;

    let geocoder = NominatimGeocoder::new(server.uri(), http());
    let county = geocoder.county_at(34.0901, -118.4065).await.unwrap();
    assert_eq!(county, "Los Angeles County");
}

#[tokio::test]
async fn test_city_search_without_results() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("city", "Atlantis"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let geocoder = NominatimGeocoder::new(server.uri(), http());
    let err = geocoder.county_for_city("Atlantis", UsState::FL).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_verify_county() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "Sanders County, MT, USA"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "address": {"county": "Sanders County", "state": "Montana", "ISO3166-2-lvl4": "US-MT"}
        }])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "Sanders County, ID, USA"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "address": {"county": "Sanders County", "state": "Montana", "ISO3166-2-lvl4": "US-MT"}
        }])))
        .mount(&server)
        .await;

    let geocoder = NominatimGeocoder::new(server.uri(), http());
    assert_eq!(
        geocoder.verify_county("Sanders", UsState::MT).await,
        VerificationOutcome::Confirmed
    );
    assert_eq!(
        geocoder.verify_county("Sanders", UsState::ID).await,
        VerificationOutcome::Disagreed
    );
    // No mock for this query: the server answers 404
    assert_eq!(
        geocoder.verify_county("Nowhere", UsState::MT).await,
        VerificationOutcome::Unavailable
    );
}
