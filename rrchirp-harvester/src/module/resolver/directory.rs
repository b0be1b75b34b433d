///! State county directory on the listing site
///!
///! The browse page for a state carries a county dropdown (and county
///! links) whose values are the county ids. The page is rendered headless
///! because the dropdown is filled in by script.

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};

use rrchirp_common::UsState;

use crate::error::{HarvestError, Result};
use crate::module::fetcher::PageRenderer;

/// County id in a browse link (`/db/browse/ctid/19` or `?ctid=19`)
static CTID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"ctid[/=](\d+)").expect("valid regex"));

/// A county offered by the directory page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountyCandidate {
    /// Display name with the county-type suffix removed
    pub name: String,
    pub id: u32,
}

impl CountyCandidate {
    pub fn new(name: impl Into<String>, id: u32) -> Self {
        Self { name: name.into(), id }
    }
}

#[async_trait]
pub trait CountyDirectory: Send + Sync {
    /// Every county listed for `state`
    async fn list_counties(&self, state: UsState) -> Result<Vec<CountyCandidate>>;
}

/// Waits until either county links or a dropdown exist
const DIRECTORY_MARKER: &str = "a[href*=\"ctid\"], select";

/// Option texts that are navigation entries, not counties
const SKIP_EXACT: [&str; 3] = ["all", "select", "choose"];
const SKIP_CONTAINING: [&str; 5] = ["trs", "agency", "department", "statewide", "nationwide"];

pub struct RenderedCountyDirectory {
    base_url: String,
    renderer: Arc<dyn PageRenderer>,
}

impl RenderedCountyDirectory {
    pub fn new(base_url: impl Into<String>, renderer: Arc<dyn PageRenderer>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            renderer,
        }
    }

    pub fn directory_url(&self, state: UsState) -> String {
        format!("{}/db/browse/stid/{}", self.base_url, state.browse_id())
    }
}

#[async_trait]
impl CountyDirectory for RenderedCountyDirectory {
    async fn list_counties(&self, state: UsState) -> Result<Vec<CountyCandidate>> {
        let url = self.directory_url(state);
        let html = self.renderer.render(&url, DIRECTORY_MARKER).await?;

        check_page_state(&html, state).map_err(|reason| HarvestError::UnexpectedPage {
            url: url.clone(),
            reason,
        })?;

        let candidates = parse_county_candidates(&html)?;
        info!("County directory for {} lists {} counties", state, candidates.len());
        Ok(candidates)
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| HarvestError::UnexpectedPage {
        url: String::new(),
        reason: format!("bad selector {:?}: {}", css, e),
    })
}

fn element_text(element: scraper::ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Make sure a rendered page belongs to `expected`.
///
/// The title and first heading are searched for a full state name (the
/// longest name found wins). A page naming a different state is rejected;
/// a page that names no state at all is accepted.
pub fn check_page_state(html: &str, expected: UsState) -> std::result::Result<(), String> {
    let document = Html::parse_document(html);
    let mut heading = String::new();
    for css in ["title", "h1"] {
        if let Ok(sel) = Selector::parse(css) {
            if let Some(el) = document.select(&sel).next() {
                heading.push_str(&element_text(el));
                heading.push(' ');
            }
        }
    }

    match UsState::find_name_in(&heading) {
        Some(found) if found != expected => {
            Err(format!("expected a page for {}, page is titled {:?}", expected.name(), heading.trim()))
        }
        _ => Ok(()),
    }
}

/// Pull county names and ids out of a state directory page.
///
/// Sources are dropdown options with numeric values (from selects named
/// for counties, or with at least three options) and links carrying a
/// `ctid`. The first occurrence of a name wins.
pub fn parse_county_candidates(html: &str) -> Result<Vec<CountyCandidate>> {
    let document = Html::parse_document(html);
    let select_sel = selector("select")?;
    let option_sel = selector("option")?;
    let link_sel = selector("a[href*=\"ctid\"]")?;

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    let mut push = |text: &str, id: u32| {
        if let Some(name) = clean_county_text(text) {
            if seen.insert(name.to_lowercase()) {
                candidates.push(CountyCandidate { name, id });
            }
        }
    };

    for select in document.select(&select_sel) {
        let attrs = select.value();
        let label = format!(
            "{} {}",
            attrs.attr("name").unwrap_or_default(),
            attrs.attr("id").unwrap_or_default()
        )
        .to_lowercase();
        let options: Vec<_> = select.select(&option_sel).collect();
        let named_for_counties = label.contains("ctid") || label.contains("county");
        if options.len() < 3 || !(named_for_counties || options.len() < 500) {
            continue;
        }

        for option in options {
            let value = option.value().attr("value").unwrap_or_default().trim();
            if value.len() < 2 || !value.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            if let Ok(id) = value.parse() {
                push(&element_text(option), id);
            }
        }
    }

    for link in document.select(&link_sel) {
        let href = link.value().attr("href").unwrap_or_default();
        let Some(id) = CTID_RE.captures(href).and_then(|c| c[1].parse().ok()) else {
            continue;
        };
        push(&element_text(link), id);
    }

    debug!("Parsed {} county candidates", candidates.len());
    Ok(candidates)
}

/// Strip the county-type suffix and reject navigation entries
fn clean_county_text(text: &str) -> Option<String> {
    let text = text.trim();
    let lower = text.to_lowercase();
    if text.len() < 2
        || SKIP_EXACT.contains(&lower.as_str())
        || SKIP_CONTAINING.iter().any(|word| lower.contains(word))
    {
        return None;
    }

    // Everything from the first suffix word on is dropped ("Kern County (CA)")
    let mut cut = text.len();
    for suffix in [" county", " borough", " census area", " parish"] {
        if let Some(idx) = lower.find(suffix) {
            cut = cut.min(idx);
        }
    }
    let name = if lower.len() == text.len() { text[..cut].trim() } else { text };
    if name.len() < 2 {
        Some(text.to_string())
    } else {
        Some(name.to_string())
    }
}
