///! Per-host request pacing
///!
///! Every outbound request (plain HTTP or headless render) waits here first so
///! that consecutive requests to one host are at least `min_interval` apart,
///! whichever component issues them.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(HashMap::new()),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until a request to the host of `url` may be sent, then record it.
    ///
    /// The lock is held across the sleep so concurrent callers queue up
    /// instead of all waking at the same instant.
    pub async fn acquire(&self, url: &str) {
        let host = host_key(url);
        let mut last_request = self.last_request.lock().await;

        if let Some(previous) = last_request.get(&host) {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                tracing::debug!("Rate limiting {}: waiting {:?}", host, wait);
                tokio::time::sleep(wait).await;
            }
        }

        last_request.insert(host, Instant::now());
    }
}

/// Host part of a URL, or the whole string if it does not parse
fn host_key(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        .unwrap_or_else(|| url.to_string())
}
