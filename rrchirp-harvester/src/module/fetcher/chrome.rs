use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

use super::PageRenderer;
use crate::error::{HarvestError, Result};
use crate::module::rate_limit::RateLimiter;

/// Headless Chrome renderer.
///
/// One browser is launched on first use and shared by later renders; each
/// render gets its own tab. A browser that failed is dropped and
/// relaunched next time.
pub struct ChromeRenderer {
    limiter: Arc<RateLimiter>,
    timeout: Duration,
    chrome_path: Option<PathBuf>,
    browser: Arc<Mutex<Option<Browser>>>,
}

impl ChromeRenderer {
    pub fn new(limiter: Arc<RateLimiter>, timeout: Duration, chrome_path: Option<PathBuf>) -> Self {
        Self {
            limiter,
            timeout,
            chrome_path,
            browser: Arc::new(Mutex::new(None)),
        }
    }
}

#[async_trait]
impl PageRenderer for ChromeRenderer {
    async fn render(&self, url: &str, marker: &str) -> Result<String> {
        self.limiter.acquire(url).await;

        let job = RenderJob {
            url: url.to_string(),
            marker: marker.to_string(),
            timeout: self.timeout,
            chrome_path: self.chrome_path.clone(),
            browser: Arc::clone(&self.browser),
        };
        tokio::task::spawn_blocking(move || job.run())
            .await
            .map_err(|e| HarvestError::Browser {
                reason: format!("render task failed: {}", e),
            })?
    }
}

/// Everything one blocking render needs, moved onto the blocking pool
struct RenderJob {
    url: String,
    marker: String,
    timeout: Duration,
    chrome_path: Option<PathBuf>,
    browser: Arc<Mutex<Option<Browser>>>,
}

impl RenderJob {
    fn run(self) -> Result<String> {
        let browser = self.browser()?;
        let result = self.render_with(&browser);
        if matches!(result, Err(HarvestError::Browser { .. })) {
            if let Ok(mut slot) = self.browser.lock() {
                *slot = None;
            }
        }
        result
    }

    fn browser(&self) -> Result<Browser> {
        let mut slot = self.browser.lock().map_err(|_| HarvestError::Browser {
            reason: "browser lock poisoned".to_string(),
        })?;
        if let Some(browser) = slot.as_ref() {
            return Ok(browser.clone());
        }

        let launch_options = LaunchOptions {
            headless: true,
            sandbox: false,
            path: self.chrome_path.clone(),
            idle_browser_timeout: self.timeout * 4,
            ..Default::default()
        };
        let browser = Browser::new(launch_options).map_err(|e| HarvestError::Browser {
            reason: format!("failed to launch headless browser: {}", e),
        })?;
        info!("Launched headless browser");
        *slot = Some(browser.clone());
        Ok(browser)
    }

    fn render_with(&self, browser: &Browser) -> Result<String> {
        let tab = browser.new_tab().map_err(|e| HarvestError::Browser {
            reason: format!("failed to open tab: {}", e),
        })?;
        tab.set_default_timeout(self.timeout);

        let content = self.load(&tab);
        if let Err(e) = tab.close(true) {
            debug!("Failed to close tab for {}: {}", self.url, e);
        }
        content
    }

    fn load(&self, tab: &Tab) -> Result<String> {
        debug!("Rendering {}", self.url);
        tab.navigate_to(&self.url)
            .map_err(|e| HarvestError::network(&self.url, e))?;
        tab.wait_until_navigated().map_err(|_| self.timed_out())?;

        // The listing tables are filled in by script after navigation
        tab.wait_for_element(&self.marker).map_err(|_| self.timed_out())?;

        tab.get_content().map_err(|e| HarvestError::Browser {
            reason: format!("failed to read page content: {}", e),
        })
    }

    fn timed_out(&self) -> HarvestError {
        HarvestError::RenderTimeout {
            url: self.url.clone(),
            waited_secs: self.timeout.as_secs(),
        }
    }
}
