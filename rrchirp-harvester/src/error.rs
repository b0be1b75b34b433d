use std::path::PathBuf;

use thiserror::Error;

use rrchirp_common::QueryError;

/// Pipeline stage an error was raised in, for log and CLI messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ZipLookup,
    Geocode,
    CountySearch,
    CacheRebuild,
    Fetch,
    Extract,
    Write,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::ZipLookup => "zip lookup",
            Stage::Geocode => "geocode",
            Stage::CountySearch => "county search",
            Stage::CacheRebuild => "cache rebuild",
            Stage::Fetch => "fetch",
            Stage::Extract => "extract",
            Stage::Write => "write",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("invalid query: {0}")]
    InvalidQuery(#[from] QueryError),

    #[error("nothing found for {query} during {stage}: {detail}")]
    NotFound {
        query: String,
        stage: Stage,
        detail: String,
    },

    #[error("\"{county}\" in {state} matches several counties, none closely enough: {}", .candidates.join(", "))]
    AmbiguousMatch {
        county: String,
        state: String,
        candidates: Vec<String>,
    },

    #[error("network error for {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("page {url} did not finish rendering within {waited_secs}s")]
    RenderTimeout { url: String, waited_secs: u64 },

    #[error("headless browser failure: {reason}")]
    Browser { reason: String },

    #[error("unexpected page content at {url} (site structure changed?): {reason}")]
    UnexpectedPage { url: String, reason: String },

    #[error("page for {location} rendered but contained no frequency rows ({skipped} rows skipped)")]
    ParseEmpty { location: String, skipped: usize },

    #[error("{path:?} has header [{}], refusing to append CHIRP rows", .found.join(","))]
    SchemaMismatch { path: PathBuf, found: Vec<String> },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl HarvestError {
    pub fn network(url: impl Into<String>, err: impl std::fmt::Display) -> Self {
        HarvestError::Network {
            url: url.into(),
            reason: err.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HarvestError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for "the thing does not exist" outcomes, as opposed to
    /// transport failures or site changes
    pub fn is_not_found(&self) -> bool {
        matches!(self, HarvestError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;
