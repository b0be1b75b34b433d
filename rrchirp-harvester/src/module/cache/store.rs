use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use rrchirp_common::UsState;

use super::types::{
    normalize_county_name, CacheDocument, CountyCacheEntry, LegacyCacheDocument, StoredEntry, VerificationOutcome,
};
use crate::error::{HarvestError, Result, Stage};
use crate::module::resolver::CountyDirectory;

/// Persistent (state, county) → county id map.
///
/// Every mutation is flushed to disk immediately through a temp file and
/// a rename, so a crash leaves either the previous or the new document.
/// If a flush fails the cache keeps working in memory for the rest of
/// the run.
pub struct CountyCache {
    path: Option<PathBuf>,
    entries: BTreeMap<UsState, BTreeMap<String, StoredEntry>>,
}

impl CountyCache {
    /// Cache without a backing file
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: BTreeMap::new(),
        }
    }

    /// Load the cache document at `path`.
    ///
    /// A missing file is an empty cache. An unreadable or corrupt file is
    /// logged and also treated as empty; it is replaced on the next flush.
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut cache = Self {
            path: Some(path.clone()),
            entries: BTreeMap::new(),
        };

        if !path.exists() {
            debug!("County cache {:?} does not exist yet", path);
            return cache;
        }

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read county cache {:?}: {}; starting empty", path, e);
                return cache;
            }
        };

        match parse_document(&content) {
            Ok(entries) => {
                cache.entries = entries;
                info!("Loaded {} counties from {:?}", cache.len(), path);
            }
            Err(e) => warn!("Failed to parse county cache {:?}: {}; starting empty", path, e),
        }
        cache
    }

    /// False once a flush failed (or for [`CountyCache::in_memory`])
    pub fn is_persistent(&self) -> bool {
        self.path.is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(|counties| counties.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_for(&self, state: UsState) -> usize {
        self.entries.get(&state).map_or(0, |counties| counties.len())
    }

    pub fn get(&self, state: UsState, county: &str) -> Option<CountyCacheEntry> {
        let key = normalize_county_name(county);
        self.entries
            .get(&state)
            .and_then(|counties| counties.get(&key))
            .map(|stored| to_entry(state, &key, stored))
    }

    /// Every entry for `state` (or all states), sorted by state then county
    pub fn entries(&self, state: Option<UsState>) -> Vec<CountyCacheEntry> {
        self.entries
            .iter()
            .filter(|(s, _)| state.is_none_or(|wanted| wanted == **s))
            .flat_map(|(s, counties)| counties.iter().map(move |(county, stored)| to_entry(*s, county, stored)))
            .collect()
    }

    /// Insert or replace one entry and flush
    pub async fn put(&mut self, entry: CountyCacheEntry) {
        self.insert(entry);
        self.flush().await;
    }

    /// Insert several entries with a single flush
    pub async fn put_many(&mut self, entries: impl IntoIterator<Item = CountyCacheEntry>) {
        for entry in entries {
            self.insert(entry);
        }
        self.flush().await;
    }

    /// Record the outcome of cross-checking an entry.
    ///
    /// `Unavailable` leaves the entry untouched. Returns false if the entry
    /// no longer exists.
    pub async fn set_verification(&mut self, state: UsState, county: &str, outcome: VerificationOutcome) -> bool {
        let key = normalize_county_name(county);
        let Some(stored) = self.entries.get_mut(&state).and_then(|c| c.get_mut(&key)) else {
            return false;
        };

        match outcome {
            VerificationOutcome::Confirmed => {
                stored.verified = true;
                stored.conflicted = false;
            }
            VerificationOutcome::Disagreed => {
                warn!("Geocoder disagrees with county id {} for {} {}", stored.id, key, state);
                stored.verified = false;
                stored.conflicted = true;
            }
            VerificationOutcome::Unavailable => return true,
        }
        self.flush().await;
        true
    }

    /// Re-scrape the county directory for one state, or for every state.
    ///
    /// A state's existing entries are replaced only after its directory
    /// page was read successfully, and every new entry is flushed as it is
    /// inserted. For a single state any failure is returned; when
    /// rebuilding everything failed states are logged and skipped.
    /// Returns the number of entries written.
    pub async fn rebuild(&mut self, state: Option<UsState>, directory: &dyn CountyDirectory) -> Result<usize> {
        if let Some(state) = state {
            return self.rebuild_state(state, directory).await;
        }

        let mut written = 0;
        let mut failed = Vec::new();
        for state in UsState::all() {
            match self.rebuild_state(state, directory).await {
                Ok(n) => written += n,
                Err(e) => {
                    warn!("Skipping {} during cache rebuild: {}", state, e);
                    failed.push(state.code());
                }
            }
        }

        if failed.is_empty() {
            info!("Rebuilt county cache for all states: {} counties", written);
        } else {
            warn!(
                "Rebuilt county cache with {} counties; {} states failed: {}",
                written,
                failed.len(),
                failed.join(", ")
            );
        }
        Ok(written)
    }

    async fn rebuild_state(&mut self, state: UsState, directory: &dyn CountyDirectory) -> Result<usize> {
        let candidates = directory.list_counties(state).await?;
        if candidates.is_empty() {
            return Err(HarvestError::NotFound {
                query: state.name().to_string(),
                stage: Stage::CacheRebuild,
                detail: "county directory listed no counties".to_string(),
            });
        }

        self.entries.remove(&state);
        let mut written = 0;
        for candidate in &candidates {
            let key = normalize_county_name(&candidate.name);
            if self.entries.get(&state).is_some_and(|c| c.contains_key(&key)) {
                continue;
            }
            self.insert(CountyCacheEntry {
                state,
                county: key,
                id: candidate.id,
                verified: false,
                conflicted: false,
            });
            // Flushed per entry so an interrupted rebuild keeps its progress
            self.flush().await;
            written += 1;
        }

        info!("Cached {} counties for {}", written, state.name());
        Ok(written)
    }

    fn insert(&mut self, entry: CountyCacheEntry) {
        let key = normalize_county_name(&entry.county);
        self.entries.entry(entry.state).or_default().insert(
            key,
            StoredEntry {
                id: entry.id,
                verified: entry.verified,
                conflicted: entry.conflicted,
            },
        );
    }

    /// Write the whole document to disk, falling back to memory-only on failure
    async fn flush(&mut self) {
        let Some(path) = self.path.clone() else {
            return;
        };

        if let Err(e) = self.write_document(&path).await {
            warn!("{}; county cache continues in memory only", e);
            self.path = None;
        }
    }

    async fn write_document(&self, path: &Path) -> Result<()> {
        let document: CacheDocument = self
            .entries
            .iter()
            .map(|(state, counties)| (state.code().to_string(), counties.clone()))
            .collect();
        let content = serde_json::to_string_pretty(&document).map_err(|e| {
            HarvestError::io(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;

        let tmp_path = temp_path_for(path);
        fs::write(&tmp_path, content)
            .await
            .map_err(|e| HarvestError::io(&tmp_path, e))?;
        fs::rename(&tmp_path, path)
            .await
            .map_err(|e| HarvestError::io(path, e))?;

        debug!("Flushed {} counties to {:?}", self.len(), path);
        Ok(())
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn to_entry(state: UsState, county: &str, stored: &StoredEntry) -> CountyCacheEntry {
    CountyCacheEntry {
        state,
        county: county.to_string(),
        id: stored.id,
        verified: stored.verified,
        conflicted: stored.conflicted,
    }
}

/// Parse a cache document, accepting the legacy layouts.
///
/// Sections may be keyed by state code or full state name. Unknown
/// sections and unparseable ids are dropped with a warning.
fn parse_document(content: &str) -> std::result::Result<BTreeMap<UsState, BTreeMap<String, StoredEntry>>, serde_json::Error> {
    let document: LegacyCacheDocument = serde_json::from_str(content)?;
    let mut entries: BTreeMap<UsState, BTreeMap<String, StoredEntry>> = BTreeMap::new();

    for (section, counties) in document {
        let Some(state) = UsState::parse(&section) else {
            warn!("Ignoring unknown state section {:?} in county cache", section);
            continue;
        };
        let target = entries.entry(state).or_default();
        for (county, value) in counties {
            match value.into_entry() {
                Some(stored) => {
                    target.insert(normalize_county_name(&county), stored);
                }
                None => warn!("Ignoring unparseable county id for {} {}", county, state),
            }
        }
    }
    Ok(entries)
}
