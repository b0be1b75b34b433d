///! Location resolution
///!
///! Turns a ZIP, city/state or county/state query into an upstream page
///! key. Each step runs an ordered chain of sources and stops at the first
///! success; when every source fails the errors are folded into one.
///! County ids discovered on the listing site are cross-checked with the
///! geocoder in background tasks whose results are applied to the cache at
///! the end of the run.

mod county;
mod directory;
mod geocoder;
mod zip;

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use rrchirp_common::{LocationKind, LocationQuery, ResolvedLocation, UpstreamId, UsState};

use crate::error::{HarvestError, Result, Stage};
use crate::module::cache::{normalize_county_name, CountyCache, VerificationOutcome};

pub use county::{
    display_county, match_county, CacheLookup, CountyHit, CountyStrategy, DirectorySearch, HitSource, KnownCounties,
    DEFAULT_THRESHOLD,
};
pub use directory::{check_page_state, parse_county_candidates, CountyCandidate, CountyDirectory, RenderedCountyDirectory};
pub use geocoder::{Geocoder, NominatimGeocoder};
pub use zip::{LocalZipDatabase, RemoteZipApi, ZipLookup, ZipPlace};

/// Collects failures from a chain of sources.
///
/// Ambiguous matches and unexpected pages are decisive and reported as
/// is. If every failure was a transport error the last one is reported,
/// otherwise the failures become one `NotFound`.
struct Attempts {
    query: String,
    stage: Stage,
    failures: Vec<String>,
    decisive: Option<HarvestError>,
    last_network: Option<HarvestError>,
    saw_not_found: bool,
}

impl Attempts {
    fn new(query: impl Into<String>, stage: Stage) -> Self {
        Self {
            query: query.into(),
            stage,
            failures: Vec::new(),
            decisive: None,
            last_network: None,
            saw_not_found: false,
        }
    }

    fn record(&mut self, source: &str, err: HarvestError) {
        debug!("{} failed for {}: {}", source, self.query, err);
        self.failures.push(format!("{}: {}", source, err));
        match err {
            HarvestError::AmbiguousMatch { .. } | HarvestError::UnexpectedPage { .. } => {
                if self.decisive.is_none() {
                    self.decisive = Some(err);
                }
            }
            HarvestError::Network { .. } | HarvestError::RenderTimeout { .. } | HarvestError::Browser { .. } => {
                self.last_network = Some(err);
            }
            _ => self.saw_not_found = true,
        }
    }

    fn into_error(self) -> HarvestError {
        if let Some(err) = self.decisive {
            return err;
        }
        if let (false, Some(err)) = (self.saw_not_found, self.last_network) {
            return err;
        }
        HarvestError::NotFound {
            query: self.query,
            stage: self.stage,
            detail: if self.failures.is_empty() {
                "no sources configured".to_string()
            } else {
                self.failures.join("; ")
            },
        }
    }
}

struct PendingVerification {
    state: UsState,
    /// County as matched on the listing site
    county: String,
    /// The query's own spelling when it differs from `county`
    alias: Option<String>,
    handle: JoinHandle<VerificationOutcome>,
}

pub struct LocationResolver {
    zip_sources: Vec<Box<dyn ZipLookup>>,
    geocoder: Arc<dyn Geocoder>,
    county_chain: Vec<Box<dyn CountyStrategy>>,
    pending: Vec<PendingVerification>,
}

impl LocationResolver {
    pub fn new(
        zip_sources: Vec<Box<dyn ZipLookup>>,
        geocoder: Arc<dyn Geocoder>,
        county_chain: Vec<Box<dyn CountyStrategy>>,
    ) -> Self {
        Self {
            zip_sources,
            geocoder,
            county_chain,
            pending: Vec::new(),
        }
    }

    /// The standard county chain: cache, known ids, directory search
    pub fn default_county_chain(directory: Arc<dyn CountyDirectory>, threshold: f64) -> Vec<Box<dyn CountyStrategy>> {
        vec![
            Box::new(CacheLookup),
            Box::new(KnownCounties),
            Box::new(DirectorySearch::new(directory, threshold)),
        ]
    }

    /// Number of verifications not yet applied
    pub fn pending_verifications(&self) -> usize {
        self.pending.len()
    }

    pub async fn resolve(&mut self, query: &LocationQuery, cache: &mut CountyCache) -> Result<ResolvedLocation> {
        info!("Resolving {}", query);
        let resolved = match query {
            LocationQuery::Zip(zip) => self.resolve_zip(zip, cache).await?,
            LocationQuery::CityState { city, state } => self.resolve_city(city, *state, cache).await?,
            LocationQuery::CountyState { county, state } => {
                let hit = self.resolve_county(county, *state, cache).await?;
                ResolvedLocation {
                    kind: LocationKind::County,
                    upstream: UpstreamId::County(hit.id),
                    display_name: format!("{} County, {}", hit.name, state),
                    state: *state,
                    city: None,
                    county: Some(hit.name),
                }
            }
        };
        info!("{} resolved to {} ({:?})", query, resolved.display_name, resolved.upstream);
        Ok(resolved)
    }

    async fn resolve_zip(&mut self, zip: &str, cache: &mut CountyCache) -> Result<ResolvedLocation> {
        let place = self.lookup_zip(zip).await?;

        let county = match place.county.clone() {
            Some(county) => Some(county),
            None => match (place.latitude, place.longitude) {
                (Some(lat), Some(lon)) => self.geocoder.county_at(lat, lon).await.ok(),
                _ => None,
            },
        };
        let county = match county {
            Some(county) => Some(county),
            None => self.county_for_city(&place.city, place.state).await,
        };

        let hit = self.county_or_statewide(county.as_deref(), place.state, cache).await?;
        Ok(match hit {
            Some(hit) => ResolvedLocation {
                kind: LocationKind::Zip,
                upstream: UpstreamId::County(hit.id),
                display_name: format!("{}, {} County, {} ({})", place.city, hit.name, place.state, zip),
                state: place.state,
                city: Some(place.city),
                county: Some(hit.name),
            },
            None => ResolvedLocation {
                kind: LocationKind::Zip,
                upstream: UpstreamId::State(place.state.query_id()),
                display_name: format!("{}, {} ({}) (statewide)", place.city, place.state, zip),
                state: place.state,
                city: Some(place.city),
                county: None,
            },
        })
    }

    async fn resolve_city(&mut self, city: &str, state: UsState, cache: &mut CountyCache) -> Result<ResolvedLocation> {
        let county = self.county_for_city(city, state).await;
        let hit = self.county_or_statewide(county.as_deref(), state, cache).await?;
        Ok(match hit {
            Some(hit) => ResolvedLocation {
                kind: LocationKind::City,
                upstream: UpstreamId::County(hit.id),
                display_name: format!("{}, {} County, {}", city, hit.name, state),
                state,
                city: Some(city.to_string()),
                county: Some(hit.name),
            },
            None => ResolvedLocation {
                kind: LocationKind::City,
                upstream: UpstreamId::State(state.query_id()),
                display_name: format!("{}, {} (statewide)", city, state),
                state,
                city: Some(city.to_string()),
                county: None,
            },
        })
    }

    /// Resolve a county id, or `None` to fall back to the state listing.
    ///
    /// Only "not found" and ambiguity fall back; transport failures are
    /// returned so an outage is not mistaken for a missing county.
    async fn county_or_statewide(
        &mut self,
        county: Option<&str>,
        state: UsState,
        cache: &mut CountyCache,
    ) -> Result<Option<CountyHit>> {
        let Some(county) = county else {
            warn!("No county known, using the {} state-wide listing", state.name());
            return Ok(None);
        };
        match self.resolve_county(county, state, cache).await {
            Ok(hit) => Ok(Some(hit)),
            Err(e @ (HarvestError::NotFound { .. } | HarvestError::AmbiguousMatch { .. })) => {
                warn!("{}; using the {} state-wide listing", e, state.name());
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn lookup_zip(&self, zip: &str) -> Result<ZipPlace> {
        let mut attempts = Attempts::new(format!("ZIP {}", zip), Stage::ZipLookup);
        for source in &self.zip_sources {
            match source.lookup(zip).await {
                Ok(place) => {
                    debug!("{} resolved ZIP {} to {}, {}", source.name(), zip, place.city, place.state);
                    return Ok(place);
                }
                Err(e) => attempts.record(source.name(), e),
            }
        }
        Err(attempts.into_error())
    }

    /// County for a city from the ZIP sources, then the geocoder
    async fn county_for_city(&self, city: &str, state: UsState) -> Option<String> {
        for source in &self.zip_sources {
            match source.county_for_city(city, state).await {
                Ok(county) => return Some(county),
                Err(e) => debug!("{} has no county for {}, {}: {}", source.name(), city, state, e),
            }
        }
        match self.geocoder.county_for_city(city, state).await {
            Ok(county) => Some(county),
            Err(e) => {
                warn!("Could not determine county for {}, {}: {}", city, state, e);
                None
            }
        }
    }

    async fn resolve_county(&mut self, county: &str, state: UsState, cache: &mut CountyCache) -> Result<CountyHit> {
        let mut attempts = Attempts::new(format!("{} County, {}", county, state), Stage::CountySearch);
        let mut found = None;
        for strategy in &self.county_chain {
            match strategy.try_resolve(county, state, cache).await {
                Ok(hit) => {
                    debug!("{} resolved {} {} to {}", strategy.name(), county, state, hit.id);
                    found = Some(hit);
                    break;
                }
                Err(e) => attempts.record(strategy.name(), e),
            }
        }

        let hit = found.ok_or_else(|| attempts.into_error())?;
        if hit.source == HitSource::Directory {
            self.spawn_verification(&hit.name, county, state);
        }
        Ok(hit)
    }

    /// Cross-check the matched county; the outcome also covers the query
    /// spelling that was cached as an alias of the match
    fn spawn_verification(&mut self, matched: &str, query: &str, state: UsState) {
        let geocoder = Arc::clone(&self.geocoder);
        let name = matched.to_string();
        let handle = tokio::spawn(async move { geocoder.verify_county(&name, state).await });
        let alias = (normalize_county_name(query) != normalize_county_name(matched)).then(|| query.to_string());
        self.pending.push(PendingVerification {
            state,
            county: matched.to_string(),
            alias,
            handle,
        });
    }

    /// Apply finished verifications to the cache, waiting at most `wait`
    /// overall. Checks still running at the deadline are abandoned and
    /// their entries stay unverified. Returns how many were applied.
    pub async fn apply_verifications(&mut self, cache: &mut CountyCache, wait: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + wait;
        let mut applied = 0;

        for pending in self.pending.drain(..) {
            let PendingVerification {
                state,
                county,
                alias,
                mut handle,
            } = pending;
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(outcome)) => {
                    if outcome != VerificationOutcome::Unavailable {
                        applied += 1;
                    }
                    cache.set_verification(state, &county, outcome).await;
                    if let Some(alias) = alias {
                        cache.set_verification(state, &alias, outcome).await;
                    }
                }
                Ok(Err(e)) => warn!("Verification task for {} {} failed: {}", county, state, e),
                Err(_) => {
                    handle.abort();
                    debug!("Verification for {} {} did not finish in time", county, state);
                }
            }
        }
        applied
    }
}
