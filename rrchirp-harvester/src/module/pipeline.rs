///! Harvester facade
///!
///! Wires resolver, fetcher and extractor together and owns the pieces
///! that must outlive a single call (rate limiter, browser, pending county
///! verifications). The county cache is passed in by the caller.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use rrchirp_common::{FrequencyRecord, LocationQuery, ResolvedLocation, UsState};

use super::cache::CountyCache;
use super::extractor::extract;
use super::fetcher::{ChromeRenderer, PageFetcher, PageRenderer};
use super::http::UpstreamHttp;
use super::rate_limit::RateLimiter;
use super::resolver::{
    CountyDirectory, LocalZipDatabase, LocationResolver, NominatimGeocoder, RemoteZipApi, RenderedCountyDirectory,
    ZipLookup,
};
use crate::config::HarvestConfig;
use crate::error::{HarvestError, Result};

pub struct Harvester {
    resolver: LocationResolver,
    fetcher: PageFetcher,
    directory: Arc<dyn CountyDirectory>,
    verification_wait: Duration,
}

impl Harvester {
    pub fn new(
        resolver: LocationResolver,
        fetcher: PageFetcher,
        directory: Arc<dyn CountyDirectory>,
        verification_wait: Duration,
    ) -> Self {
        Self {
            resolver,
            fetcher,
            directory,
            verification_wait,
        }
    }

    /// Production wiring: headless Chrome, zippopotam, Nominatim and the
    /// optional local ZIP database, all behind one rate limiter
    pub fn from_config(config: &HarvestConfig) -> Result<Self> {
        let limiter = Arc::new(RateLimiter::new(config.request_interval()));
        let http = UpstreamHttp::new(config, Arc::clone(&limiter))?;
        let renderer: Arc<dyn PageRenderer> = Arc::new(ChromeRenderer::new(
            Arc::clone(&limiter),
            config.render_timeout(),
            config.chrome_path.clone(),
        ));

        let mut zip_sources: Vec<Box<dyn ZipLookup>> = Vec::new();
        match &config.zip_database {
            Some(path) => match LocalZipDatabase::open(path) {
                Ok(db) => zip_sources.push(Box::new(db)),
                Err(e) => warn!("Local ZIP database unavailable: {}", e),
            },
            None => info!("No local ZIP database configured, using the ZIP web API only"),
        }
        zip_sources.push(Box::new(RemoteZipApi::new(&config.zip_api_url, http.clone())));

        let geocoder = Arc::new(NominatimGeocoder::new(&config.geocoder_url, http));
        let directory: Arc<dyn CountyDirectory> =
            Arc::new(RenderedCountyDirectory::new(&config.base_url, Arc::clone(&renderer)));
        let county_chain = LocationResolver::default_county_chain(Arc::clone(&directory), config.fuzzy_threshold);

        let resolver = LocationResolver::new(zip_sources, geocoder, county_chain);
        let fetcher = PageFetcher::new(&config.base_url, &config.content_marker, renderer);
        Ok(Self::new(resolver, fetcher, directory, config.verification_wait()))
    }

    pub async fn resolve(&mut self, query: &LocationQuery, cache: &mut CountyCache) -> Result<ResolvedLocation> {
        self.resolver.resolve(query, cache).await
    }

    /// Fetch the listing page and extract its records.
    ///
    /// For city queries, records that mention the city come first.
    /// A page without any frequency row fails with `ParseEmpty`.
    pub async fn fetch_and_extract(&self, location: &ResolvedLocation) -> Result<Vec<FrequencyRecord>> {
        let html = self.fetcher.fetch(location).await?;
        let (records, skipped) = extract(&html)?.into_parts();

        if records.is_empty() {
            return Err(HarvestError::ParseEmpty {
                location: location.display_name.clone(),
                skipped,
            });
        }
        info!(
            "Extracted {} frequencies for {} ({} rows skipped)",
            records.len(),
            location.display_name,
            skipped
        );

        Ok(match &location.city {
            Some(city) => prioritize_city(records, city),
            None => records,
        })
    }

    /// Resolve and fetch `query`, hand the records to `deliver`, then apply
    /// pending verifications.
    ///
    /// `deliver` runs before any verification is awaited. Verifications are
    /// applied even when resolution or fetching failed.
    pub async fn harvest<T, E>(
        &mut self,
        query: &LocationQuery,
        cache: &mut CountyCache,
        deliver: impl FnOnce(ResolvedLocation, Vec<FrequencyRecord>) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<HarvestError>,
    {
        let harvested = match self.resolve(query, cache).await {
            Ok(location) => self
                .fetch_and_extract(&location)
                .await
                .map(|records| (location, records)),
            Err(e) => Err(e),
        };
        let result = match harvested {
            Ok((location, records)) => deliver(location, records),
            Err(e) => Err(E::from(e)),
        };

        self.finish(cache).await;
        result
    }

    pub async fn rebuild_cache(&self, cache: &mut CountyCache, state: Option<UsState>) -> Result<usize> {
        cache.rebuild(state, self.directory.as_ref()).await
    }

    /// Apply pending county verifications before exit
    pub async fn finish(&mut self, cache: &mut CountyCache) -> usize {
        if self.resolver.pending_verifications() == 0 {
            return 0;
        }
        self.resolver.apply_verifications(cache, self.verification_wait).await
    }
}

/// Stable partition: records mentioning `city` first
pub fn prioritize_city(records: Vec<FrequencyRecord>, city: &str) -> Vec<FrequencyRecord> {
    let needle = city.trim().to_lowercase();
    if needle.is_empty() {
        return records;
    }

    let mentions = |record: &FrequencyRecord| {
        [&record.alpha_tag, &record.description]
            .into_iter()
            .flatten()
            .chain(record.raw_fields.values())
            .any(|text| text.to_lowercase().contains(&needle))
    };
    let (mut local, rest): (Vec<_>, Vec<_>) = records.into_iter().partition(|r| mentions(r));
    local.extend(rest);
    local
}
