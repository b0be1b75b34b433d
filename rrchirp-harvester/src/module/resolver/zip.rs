///! ZIP code sources
///!
///! Two sources sit behind [`ZipLookup`]: an optional local CSV database
///! and the zippopotam.us web API. The resolver tries them in order.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use rrchirp_common::UsState;

use crate::error::{HarvestError, Result, Stage};
use crate::module::http::UpstreamHttp;

/// What a ZIP code resolves to
#[derive(Debug, Clone, PartialEq)]
pub struct ZipPlace {
    pub zip: String,
    pub city: String,
    pub state: UsState,
    /// Not every source knows the county
    pub county: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[async_trait]
pub trait ZipLookup: Send + Sync {
    /// Short source name for logs and aggregated errors
    fn name(&self) -> &'static str;

    async fn lookup(&self, zip: &str) -> Result<ZipPlace>;

    /// Most common county among the source's ZIP codes for a city
    async fn county_for_city(&self, city: &str, state: UsState) -> Result<String> {
        Err(HarvestError::NotFound {
            query: format!("{}, {}", city, state),
            stage: Stage::ZipLookup,
            detail: format!("{} has no city index", self.name()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ZipDatabaseRow {
    zip: String,
    city: String,
    state: String,
    #[serde(default)]
    county: Option<String>,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
}

/// ZIP database loaded from a CSV file with the columns
/// `zip,city,state,county,latitude,longitude`
pub struct LocalZipDatabase {
    by_zip: HashMap<String, ZipPlace>,
}

impl LocalZipDatabase {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)?;
        let db = Self::from_reader(reader)?;
        info!("Loaded {} ZIP codes from {:?}", db.by_zip.len(), path);
        Ok(db)
    }

    pub fn from_csv_str(data: &str) -> Result<Self> {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(data.as_bytes());
        Self::from_reader(reader)
    }

    fn from_reader<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Self> {
        let mut by_zip = HashMap::new();
        for row in reader.deserialize::<ZipDatabaseRow>() {
            let row = row?;
            let Some(state) = UsState::parse(&row.state) else {
                debug!("Skipping ZIP {} with unknown state {:?}", row.zip, row.state);
                continue;
            };
            let place = ZipPlace {
                zip: row.zip.clone(),
                city: row.city,
                state,
                county: row.county.filter(|c| !c.trim().is_empty()),
                latitude: row.latitude,
                longitude: row.longitude,
            };
            by_zip.insert(row.zip, place);
        }
        Ok(Self { by_zip })
    }

    pub fn len(&self) -> usize {
        self.by_zip.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_zip.is_empty()
    }
}

#[async_trait]
impl ZipLookup for LocalZipDatabase {
    fn name(&self) -> &'static str {
        "local ZIP database"
    }

    async fn lookup(&self, zip: &str) -> Result<ZipPlace> {
        self.by_zip.get(zip).cloned().ok_or_else(|| HarvestError::NotFound {
            query: format!("ZIP {}", zip),
            stage: Stage::ZipLookup,
            detail: "not in local ZIP database".to_string(),
        })
    }

    async fn county_for_city(&self, city: &str, state: UsState) -> Result<String> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for place in self.by_zip.values() {
            if place.state == state && place.city.eq_ignore_ascii_case(city) {
                if let Some(county) = place.county.as_deref() {
                    *counts.entry(county).or_default() += 1;
                }
            }
        }

        // Ties go to the alphabetically first county so results are stable
        counts
            .into_iter()
            .max_by(|(a_name, a_count), (b_name, b_count)| a_count.cmp(b_count).then(b_name.cmp(a_name)))
            .map(|(county, _)| county.to_string())
            .ok_or_else(|| HarvestError::NotFound {
                query: format!("{}, {}", city, state),
                stage: Stage::ZipLookup,
                detail: "city not in local ZIP database".to_string(),
            })
    }
}

#[derive(Debug, Deserialize)]
struct ZippopotamResponse {
    #[serde(default)]
    places: Vec<ZippopotamPlace>,
}

#[derive(Debug, Deserialize)]
struct ZippopotamPlace {
    #[serde(rename = "place name")]
    place_name: String,
    #[serde(rename = "state abbreviation")]
    state_abbreviation: String,
    #[serde(default)]
    latitude: Option<String>,
    #[serde(default)]
    longitude: Option<String>,
}

/// zippopotam.us style API: `GET {base}/us/{zip}`
pub struct RemoteZipApi {
    base_url: String,
    http: UpstreamHttp,
}

impl RemoteZipApi {
    pub fn new(base_url: impl Into<String>, http: UpstreamHttp) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }
}

#[async_trait]
impl ZipLookup for RemoteZipApi {
    fn name(&self) -> &'static str {
        "ZIP web API"
    }

    async fn lookup(&self, zip: &str) -> Result<ZipPlace> {
        let url = format!("{}/us/{}", self.base_url, zip);
        let response: ZippopotamResponse = self.http.get_json(&url, &[], Stage::ZipLookup).await?;

        let place = response.places.into_iter().next().ok_or_else(|| HarvestError::NotFound {
            query: format!("ZIP {}", zip),
            stage: Stage::ZipLookup,
            detail: "API returned no places".to_string(),
        })?;

        let state = UsState::parse(&place.state_abbreviation).ok_or_else(|| HarvestError::UnexpectedPage {
            url: url.clone(),
            reason: format!("unknown state abbreviation {:?}", place.state_abbreviation),
        })?;

        Ok(ZipPlace {
            zip: zip.to_string(),
            city: place.place_name,
            state,
            county: None,
            latitude: place.latitude.and_then(|v| v.trim().parse().ok()),
            longitude: place.longitude.and_then(|v| v.trim().parse().ok()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZIPS: &str = "\
zip,city,state,county,latitude,longitude
90210,Beverly Hills,CA,Los Angeles County,34.0901,-118.4065
90211,Beverly Hills,CA,Los Angeles County,34.0652,-118.3830
59874,Trout Creek,MT,Sanders County,47.8366,-115.6057
00000,Nowhere,ZZ,,,
98101,Seattle,WA,,47.6114,-122.3305
";

    #[tokio::test]
    async fn test_local_lookup() {
        let db = LocalZipDatabase::from_csv_str(ZIPS).unwrap();
        assert_eq!(db.len(), 4);

        let place = db.lookup("90210").await.unwrap();
        assert_eq!(place.city, "Beverly Hills");
        assert_eq!(place.state, UsState::CA);
        assert_eq!(place.county.as_deref(), Some("Los Angeles County"));

        let place = db.lookup("98101").await.unwrap();
        assert_eq!(place.county, None);

        assert!(db.lookup("12345").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_local_city_to_county() {
        let db = LocalZipDatabase::from_csv_str(ZIPS).unwrap();
        assert_eq!(
            db.county_for_city("beverly hills", UsState::CA).await.unwrap(),
            "Los Angeles County"
        );
        assert!(db.county_for_city("Beverly Hills", UsState::MT).await.is_err());
        assert!(db.county_for_city("Seattle", UsState::WA).await.is_err());
    }
}
