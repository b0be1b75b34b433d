///! Listing page fetcher
///!
///! Listing pages build their frequency tables with script, so pages are
///! rendered in a headless browser and returned only once the content
///! marker exists. The renderer is a trait so tests can serve fixtures.

mod chrome;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use rrchirp_common::ResolvedLocation;

use crate::error::Result;

pub use chrome::ChromeRenderer;

#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Load `url`, wait until an element matching the CSS selector
    /// `marker` exists, and return the rendered HTML.
    ///
    /// Fails with `RenderTimeout` if the marker does not appear in time.
    async fn render(&self, url: &str, marker: &str) -> Result<String>;
}

pub struct PageFetcher {
    base_url: String,
    content_marker: String,
    renderer: Arc<dyn PageRenderer>,
}

impl PageFetcher {
    pub fn new(base_url: impl Into<String>, content_marker: impl Into<String>, renderer: Arc<dyn PageRenderer>) -> Self {
        Self {
            base_url: base_url.into(),
            content_marker: content_marker.into(),
            renderer,
        }
    }

    pub fn page_url(&self, location: &ResolvedLocation) -> String {
        location.upstream.page_url(&self.base_url)
    }

    /// Rendered listing page for a resolved location
    pub async fn fetch(&self, location: &ResolvedLocation) -> Result<String> {
        let url = self.page_url(location);
        info!("Fetching listing for {} from {}", location.display_name, url);
        let html = self.renderer.render(&url, &self.content_marker).await?;
        info!("Fetched {} bytes for {}", html.len(), location.display_name);
        Ok(html)
    }
}
