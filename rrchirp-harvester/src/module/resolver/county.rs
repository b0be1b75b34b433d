///! County name → county id strategies
///!
///! Tried in order by the resolver: the persistent cache, a short table of
///! well known ids, then a search of the state's county directory.

use async_trait::async_trait;
use std::sync::Arc;
use strsim::jaro_winkler;
use tracing::{debug, info};

use rrchirp_common::UsState;

use super::directory::{CountyCandidate, CountyDirectory};
use crate::error::{HarvestError, Result, Stage};
use crate::module::cache::{normalize_county_name, CountyCache, CountyCacheEntry};

/// Default similarity threshold for fuzzy county matching
pub const DEFAULT_THRESHOLD: f64 = 0.85;

/// How many near misses to list in an ambiguous match error
const MAX_LISTED_CANDIDATES: usize = 5;

/// County ids that are known without any lookup
const KNOWN_COUNTIES: [(&str, UsState, u32); 7] = [
    ("sanders", UsState::MT, 1638),
    ("king", UsState::WA, 2974),
    ("santa barbara", UsState::CA, 83),
    ("los angeles", UsState::CA, 19),
    ("orange", UsState::CA, 59),
    ("san diego", UsState::CA, 61),
    ("san francisco", UsState::CA, 60),
];

/// Where a county id came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitSource {
    Cache,
    KnownTable,
    /// Freshly found on the listing site; worth verifying
    Directory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountyHit {
    pub id: u32,
    /// Display name as best known ("Los Angeles")
    pub name: String,
    pub source: HitSource,
}

#[async_trait]
pub trait CountyStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn try_resolve(&self, county: &str, state: UsState, cache: &mut CountyCache) -> Result<CountyHit>;
}

fn not_found(county: &str, state: UsState, detail: &str) -> HarvestError {
    HarvestError::NotFound {
        query: format!("{} County, {}", county, state),
        stage: Stage::CountySearch,
        detail: detail.to_string(),
    }
}

/// Title-case a normalized county key for display ("san diego" → "San Diego")
pub fn display_county(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct CacheLookup;

#[async_trait]
impl CountyStrategy for CacheLookup {
    fn name(&self) -> &'static str {
        "county cache"
    }

    async fn try_resolve(&self, county: &str, state: UsState, cache: &mut CountyCache) -> Result<CountyHit> {
        let entry = cache
            .get(state, county)
            .ok_or_else(|| not_found(county, state, "not cached"))?;
        if entry.conflicted {
            debug!("Using cached county id {} for {} {} despite geocoder conflict", entry.id, county, state);
        }
        Ok(CountyHit {
            id: entry.id,
            name: display_county(&entry.county),
            source: HitSource::Cache,
        })
    }
}

pub struct KnownCounties;

#[async_trait]
impl CountyStrategy for KnownCounties {
    fn name(&self) -> &'static str {
        "known county table"
    }

    async fn try_resolve(&self, county: &str, state: UsState, _cache: &mut CountyCache) -> Result<CountyHit> {
        let key = normalize_county_name(county);
        KNOWN_COUNTIES
            .iter()
            .find(|(name, s, _)| *s == state && *name == key)
            .map(|(name, _, id)| CountyHit {
                id: *id,
                name: display_county(name),
                source: HitSource::KnownTable,
            })
            .ok_or_else(|| not_found(county, state, "not in known county table"))
    }
}

/// Search the county directory of the state, writing what it finds to the cache
pub struct DirectorySearch {
    directory: Arc<dyn CountyDirectory>,
    threshold: f64,
}

impl DirectorySearch {
    pub fn new(directory: Arc<dyn CountyDirectory>, threshold: f64) -> Self {
        Self { directory, threshold }
    }
}

#[async_trait]
impl CountyStrategy for DirectorySearch {
    fn name(&self) -> &'static str {
        "county directory search"
    }

    async fn try_resolve(&self, county: &str, state: UsState, cache: &mut CountyCache) -> Result<CountyHit> {
        let candidates = self.directory.list_counties(state).await?;
        let matched = match_county(county, state, &candidates, self.threshold)?.clone();
        info!("Matched {} {} to county id {} ({})", county, state, matched.id, matched.name);

        // Every listed county is cached so later lookups in this state stay local
        let entries = candidates
            .iter()
            .filter(|c| cache.get(state, &c.name).is_none() || c.id == matched.id)
            .map(|c| CountyCacheEntry::discovered(state, &c.name, c.id));
        let entries: Vec<_> = entries.collect();
        cache.put_many(entries).await;

        // The query's own spelling points at the match too
        if cache.get(state, county).is_none() {
            cache.put(CountyCacheEntry::discovered(state, county, matched.id)).await;
        }

        Ok(CountyHit {
            id: matched.id,
            name: matched.name,
            source: HitSource::Directory,
        })
    }
}

/// Pick the candidate for `county`.
///
/// # Match Priority
/// 1. Exact match on the normalized name
/// 2. Best Jaro-Winkler similarity at or above `threshold`
///
/// Below the threshold the closest candidates are reported as an
/// ambiguous match.
pub fn match_county<'a>(
    county: &str,
    state: UsState,
    candidates: &'a [CountyCandidate],
    threshold: f64,
) -> Result<&'a CountyCandidate> {
    if candidates.is_empty() {
        return Err(not_found(county, state, "county directory is empty"));
    }

    let query = normalize_county_name(county);
    if let Some(exact) = candidates.iter().find(|c| normalize_county_name(&c.name) == query) {
        return Ok(exact);
    }

    let mut scored: Vec<(f64, &CountyCandidate)> = candidates
        .iter()
        .map(|c| (jaro_winkler(&query, &normalize_county_name(&c.name)), c))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    match scored.first() {
        Some((score, best)) if *score >= threshold => {
            debug!("Fuzzy matched {:?} to {:?} (score {:.3})", county, best.name, score);
            Ok(best)
        }
        _ => Err(HarvestError::AmbiguousMatch {
            county: county.to_string(),
            state: state.code().to_string(),
            candidates: scored
                .iter()
                .take(MAX_LISTED_CANDIDATES)
                .map(|(_, c)| c.name.clone())
                .collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn california() -> Vec<CountyCandidate> {
        vec![
            CountyCandidate::new("Los Angeles", 19),
            CountyCandidate::new("San Diego", 61),
            CountyCandidate::new("San Mateo", 75),
            CountyCandidate::new("San Benito", 70),
            CountyCandidate::new("Kern", 15),
        ]
    }

    struct CountingDirectory {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CountyDirectory for CountingDirectory {
        async fn list_counties(&self, _state: UsState) -> Result<Vec<CountyCandidate>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(california())
        }
    }

    #[test]
    fn test_exact_and_fuzzy_match() {
        let candidates = california();
        let hit = match_county("san diego county", UsState::CA, &candidates, DEFAULT_THRESHOLD).unwrap();
        assert_eq!(hit.id, 61);

        let hit = match_county("Los Angelos", UsState::CA, &candidates, DEFAULT_THRESHOLD).unwrap();
        assert_eq!(hit.id, 19);
    }

    #[test]
    fn test_below_threshold_is_ambiguous() {
        let candidates = california();
        let err = match_county("Xyzzy", UsState::CA, &candidates, DEFAULT_THRESHOLD).unwrap_err();
        match err {
            HarvestError::AmbiguousMatch { candidates, state, .. } => {
                assert_eq!(state, "CA");
                assert_eq!(candidates.len(), 5);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(match_county("Kern", UsState::CA, &[], DEFAULT_THRESHOLD).unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_known_table() {
        let mut cache = CountyCache::in_memory();
        let hit = KnownCounties.try_resolve("Sanders County", UsState::MT, &mut cache).await.unwrap();
        assert_eq!(hit.id, 1638);
        assert_eq!(hit.name, "Sanders");
        assert!(KnownCounties.try_resolve("Sanders", UsState::CA, &mut cache).await.is_err());
    }

    #[tokio::test]
    async fn test_directory_search_fills_cache() {
        let directory = Arc::new(CountingDirectory { calls: AtomicUsize::new(0) });
        let search = DirectorySearch::new(directory.clone(), DEFAULT_THRESHOLD);
        let mut cache = CountyCache::in_memory();

        let hit = search.try_resolve("Kern", UsState::CA, &mut cache).await.unwrap();
        assert_eq!(hit.id, 15);
        assert_eq!(hit.source, HitSource::Directory);
        assert_eq!(cache.count_for(UsState::CA), 5);

        let cached = CacheLookup.try_resolve("kern", UsState::CA, &mut cache).await.unwrap();
        assert_eq!(cached.id, 15);
        assert_eq!(cached.name, "Kern");
        assert_eq!(directory.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_display_county() {
        assert_eq!(display_county("san luis obispo"), "San Luis Obispo");
        assert_eq!(display_county("st louis"), "St Louis");
    }
}
