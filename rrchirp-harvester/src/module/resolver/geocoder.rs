use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use rrchirp_common::UsState;

use crate::error::{HarvestError, Result, Stage};
use crate::module::cache::{normalize_county_name, VerificationOutcome};
use crate::module::http::UpstreamHttp;

/// Independent location source used to fill in missing counties and to
/// cross-check county ids discovered on the listing site
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// County containing a coordinate
    async fn county_at(&self, latitude: f64, longitude: f64) -> Result<String>;

    /// County a city belongs to
    async fn county_for_city(&self, city: &str, state: UsState) -> Result<String>;

    /// Whether `county` exists in `state`. Never fails; problems reaching
    /// the geocoder are reported as [`VerificationOutcome::Unavailable`].
    async fn verify_county(&self, county: &str, state: UsState) -> VerificationOutcome;
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    #[serde(default)]
    county: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default, rename = "ISO3166-2-lvl4")]
    iso_state: Option<String>,
}

impl NominatimAddress {
    fn state(&self) -> Option<UsState> {
        if let Some(iso) = self.iso_state.as_deref() {
            if let Some(state) = iso.strip_prefix("US-").and_then(UsState::parse) {
                return Some(state);
            }
        }
        self.state.as_deref().and_then(UsState::parse)
    }
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    #[serde(default)]
    address: NominatimAddress,
}

/// OpenStreetMap Nominatim (or a compatible server)
pub struct NominatimGeocoder {
    base_url: String,
    http: UpstreamHttp,
}

impl NominatimGeocoder {
    pub fn new(base_url: impl Into<String>, http: UpstreamHttp) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    async fn search(&self, query: &[(&str, &str)]) -> Result<Option<NominatimAddress>> {
        let url = format!("{}/search", self.base_url);
        let mut params = vec![("format", "json"), ("addressdetails", "1"), ("limit", "1")];
        params.extend_from_slice(query);

        let places: Vec<NominatimPlace> = self.http.get_json(&url, &params, Stage::Geocode).await?;
        Ok(places.into_iter().next().map(|p| p.address))
    }
}

fn county_from(address: Option<NominatimAddress>, query: String) -> Result<String> {
    address
        .and_then(|a| a.county)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| HarvestError::NotFound {
            query,
            stage: Stage::Geocode,
            detail: "geocoder returned no county".to_string(),
        })
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn county_at(&self, latitude: f64, longitude: f64) -> Result<String> {
        let url = format!("{}/reverse", self.base_url);
        let lat = latitude.to_string();
        let lon = longitude.to_string();
        let params = [
            ("format", "json"),
            ("addressdetails", "1"),
            ("zoom", "10"),
            ("lat", lat.as_str()),
            ("lon", lon.as_str()),
        ];

        let place: NominatimPlace = self.http.get_json(&url, &params, Stage::Geocode).await?;
        county_from(Some(place.address), format!("{},{}", lat, lon))
    }

    async fn county_for_city(&self, city: &str, state: UsState) -> Result<String> {
        let address = self
            .search(&[("city", city), ("state", state.name()), ("country", "USA")])
            .await?;
        county_from(address, format!("{}, {}", city, state))
    }

    async fn verify_county(&self, county: &str, state: UsState) -> VerificationOutcome {
        let query = format!("{} County, {}, USA", county, state.code());
        let address = match self.search(&[("q", query.as_str())]).await {
            Ok(Some(address)) => address,
            Ok(None) => {
                debug!("Geocoder has no result for {}", query);
                return VerificationOutcome::Unavailable;
            }
            Err(e) => {
                debug!("County verification for {} unavailable: {}", query, e);
                return VerificationOutcome::Unavailable;
            }
        };

        compare_address(&address, county, state)
    }
}

fn compare_address(address: &NominatimAddress, county: &str, state: UsState) -> VerificationOutcome {
    if address.state() != Some(state) {
        return VerificationOutcome::Disagreed;
    }
    let Some(found) = address.county.as_deref() else {
        // State matched and the geocoder has no county level for this place
        return VerificationOutcome::Confirmed;
    };

    let expected = normalize_county_name(county);
    let found = normalize_county_name(found);
    if found == expected || found.starts_with(&expected) || expected.starts_with(&found) {
        VerificationOutcome::Confirmed
    } else {
        VerificationOutcome::Disagreed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(county: Option<&str>, state: Option<&str>, iso: Option<&str>) -> NominatimAddress {
        NominatimAddress {
            county: county.map(String::from),
            state: state.map(String::from),
            iso_state: iso.map(String::from),
        }
    }

    #[test]
    fn test_compare_address() {
        let la = address(Some("Los Angeles County"), Some("California"), Some("US-CA"));
        assert_eq!(compare_address(&la, "los angeles", UsState::CA), VerificationOutcome::Confirmed);
        assert_eq!(compare_address(&la, "orange", UsState::CA), VerificationOutcome::Disagreed);
        assert_eq!(compare_address(&la, "los angeles", UsState::NV), VerificationOutcome::Disagreed);

        let no_iso = address(Some("King County"), Some("Washington"), None);
        assert_eq!(compare_address(&no_iso, "King", UsState::WA), VerificationOutcome::Confirmed);

        let no_county = address(None, Some("District of Columbia"), None);
        assert_eq!(compare_address(&no_county, "District of Columbia", UsState::DC), VerificationOutcome::Confirmed);
    }

    #[test]
    fn test_parse_search_response() {
        let body = r#"[{"display_name": "Sanders County, Montana, United States",
            "address": {"county": "Sanders County", "state": "Montana", "ISO3166-2-lvl4": "US-MT", "country_code": "us"}}]"#;
        let places: Vec<NominatimPlace> = serde_json::from_str(body).unwrap();
        assert_eq!(places[0].address.state(), Some(UsState::MT));
        assert_eq!(places[0].address.county.as_deref(), Some("Sanders County"));
    }
}
