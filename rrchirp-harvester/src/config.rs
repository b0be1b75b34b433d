use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_PATH: &str = "rrchirp.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Frequency listing site
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Remote ZIP lookup API (zippopotam.us compatible)
    #[serde(default = "default_zip_api_url")]
    pub zip_api_url: String,

    /// Nominatim compatible geocoder
    #[serde(default = "default_geocoder_url")]
    pub geocoder_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// County id cache document
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,

    /// Optional local ZIP database (CSV: zip,city,state,county,latitude,longitude)
    #[serde(default)]
    pub zip_database: Option<PathBuf>,

    /// Minimum spacing between requests to the same host
    #[serde(default = "default_request_interval_ms")]
    pub request_interval_ms: u64,

    /// Plain HTTP request timeout
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Upper bound on waiting for the rendered frequency table
    #[serde(default = "default_render_timeout_secs")]
    pub render_timeout_secs: u64,

    /// CSS selector that marks a fully rendered listing page
    #[serde(default = "default_content_marker")]
    pub content_marker: String,

    /// Jaro-Winkler similarity needed to accept a fuzzy county match
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,

    /// Chrome/Chromium binary; auto-detected when unset
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,

    /// How long to wait for pending county verifications at the end of a run
    #[serde(default = "default_verification_wait_secs")]
    pub verification_wait_secs: u64,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_base_url() -> String {
    "https://www.radioreference.com".to_string()
}

fn default_zip_api_url() -> String {
    "https://api.zippopotam.us".to_string()
}

fn default_geocoder_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_user_agent() -> String {
    concat!("rrchirp/", env!("CARGO_PKG_VERSION"), " (frequency harvester)").to_string()
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("countyID.db")
}

fn default_request_interval_ms() -> u64 {
    1000
}

fn default_http_timeout_secs() -> u64 {
    15
}

fn default_render_timeout_secs() -> u64 {
    30
}

fn default_content_marker() -> String {
    "table".to_string()
}

fn default_fuzzy_threshold() -> f64 {
    0.85
}

fn default_verification_wait_secs() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            zip_api_url: default_zip_api_url(),
            geocoder_url: default_geocoder_url(),
            user_agent: default_user_agent(),
            cache_path: default_cache_path(),
            zip_database: None,
            request_interval_ms: default_request_interval_ms(),
            http_timeout_secs: default_http_timeout_secs(),
            render_timeout_secs: default_render_timeout_secs(),
            content_marker: default_content_marker(),
            fuzzy_threshold: default_fuzzy_threshold(),
            chrome_path: None,
            verification_wait_secs: default_verification_wait_secs(),
            log_level: default_log_level(),
            log_dir: default_log_dir(),
        }
    }
}

impl HarvestConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: HarvestConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        Ok(config)
    }

    /// Load `path` if given, else the default file if present, else defaults.
    ///
    /// An explicitly named file that does not exist is an error.
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(DEFAULT_CONFIG_PATH),
            None => Ok(Self::default()),
        }
    }

    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn verification_wait(&self) -> Duration {
        Duration::from_secs(self.verification_wait_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: HarvestConfig = toml::from_str(
            r#"
            request_interval_ms = 2500
            zip_database = "data/zips.csv"
            "#,
        )
        .unwrap();
        assert_eq!(config.request_interval(), Duration::from_millis(2500));
        assert_eq!(config.zip_database, Some(PathBuf::from("data/zips.csv")));
        assert_eq!(config.base_url, "https://www.radioreference.com");
        assert_eq!(config.cache_path, PathBuf::from("countyID.db"));
        assert!((config.fuzzy_threshold - 0.85).abs() < f64::EPSILON);
        assert_eq!(config.verification_wait(), Duration::from_secs(5));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result = HarvestConfig::load_or_default(Some(Path::new("/nonexistent/rrchirp.toml")));
        assert!(result.is_err());
    }
}
