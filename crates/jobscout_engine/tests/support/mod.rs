//! Scripted in-memory page for session and pagination tests. Documents are
//! plain HTML served from a route table; a few `data-*` attributes script
//! what a real browser would do on click.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use jobscout_core::SelectorConfig;
use jobscout_engine::{
    BrowserError, BrowserErrorKind, BrowserPage, CrawlSettings, ReqwestFetcher, StaticElement,
    StaticPage,
};

pub const SITE: &str = "https://careers.acme.example/jobs";

const CLOSED: &str = "Target page, context or browser has been closed";
const LOST_CONTEXT: &str = "Cannot find context with specified id";
const STALE: &str = "Execution context was destroyed, most likely because of a navigation";

/// Click behaviour:
/// * `data-goto="url"` navigates to a routed url (history grows);
/// * `data-swap="key"` replaces the document in place (same url);
/// * `<a href>` navigates when the resolved url is routed.
pub struct ScriptedPage {
    inner: StaticPage,
    routes: Mutex<HashMap<String, String>>,
    swaps: Mutex<HashMap<String, String>>,
    scroll_frames: Mutex<VecDeque<String>>,
    terminate_marker: Mutex<Option<String>>,
    quiet_marker: Mutex<Option<String>>,
    closed: AtomicBool,
    calls_after_close: AtomicUsize,
    stale_after_click: AtomicBool,
    stale_pending: AtomicBool,
    back_budget: Mutex<Option<usize>>,
    visited: Mutex<HashSet<String>>,
    scrolls: AtomicUsize,
    clicks: AtomicUsize,
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self {
            inner: StaticPage::new(Arc::new(ReqwestFetcher::default())),
            routes: Mutex::new(HashMap::new()),
            swaps: Mutex::new(HashMap::new()),
            scroll_frames: Mutex::new(VecDeque::new()),
            terminate_marker: Mutex::new(None),
            quiet_marker: Mutex::new(None),
            closed: AtomicBool::new(false),
            calls_after_close: AtomicUsize::new(0),
            stale_after_click: AtomicBool::new(false),
            stale_pending: AtomicBool::new(false),
            back_budget: Mutex::new(None),
            visited: Mutex::new(HashSet::new()),
            scrolls: AtomicUsize::new(0),
            clicks: AtomicUsize::new(0),
        }
    }

    pub fn route(self, url: &str, html: impl Into<String>) -> Self {
        self.routes.lock().unwrap().insert(url.to_string(), html.into());
        self
    }

    pub fn swap(self, key: &str, html: impl Into<String>) -> Self {
        self.swaps.lock().unwrap().insert(key.to_string(), html.into());
        self
    }

    /// Each scroll to the bottom renders the next frame; once frames run out
    /// the document stops changing.
    pub fn scroll_frames(self, frames: Vec<String>) -> Self {
        *self.scroll_frames.lock().unwrap() = frames.into();
        self
    }

    /// Closes the browser the first time any read text contains `marker`.
    pub fn terminate_on_text(self, marker: &str) -> Self {
        *self.terminate_marker.lock().unwrap() = Some(marker.to_string());
        self
    }

    /// Closes the page without failing the read that returned `marker`,
    /// from an element's text or attribute. Later calls fail with a lost
    /// context error that does not look like a closed browser.
    pub fn close_quietly_on(self, marker: &str) -> Self {
        *self.quiet_marker.lock().unwrap() = Some(marker.to_string());
        self
    }

    /// The first query after every click fails once with a stale context,
    /// as Chromium does while a navigation commits.
    pub fn stale_after_click(self) -> Self {
        self.stale_after_click.store(true, Ordering::SeqCst);
        self
    }

    /// History back works `budget` times. After that it fails, and so does
    /// navigating to any url loaded before.
    pub fn history_breaks_after(self, budget: usize) -> Self {
        *self.back_budget.lock().unwrap() = Some(budget);
        self
    }

    pub fn calls_after_close(&self) -> usize {
        self.calls_after_close.load(Ordering::SeqCst)
    }

    pub fn scrolls(&self) -> usize {
        self.scrolls.load(Ordering::SeqCst)
    }

    pub fn clicks(&self) -> usize {
        self.clicks.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), BrowserError> {
        if !self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.calls_after_close.fetch_add(1, Ordering::SeqCst);
        if self.quiet_marker.lock().unwrap().is_some() {
            Err(BrowserError::new(BrowserErrorKind::StaleElement, LOST_CONTEXT))
        } else {
            Err(BrowserError::new(BrowserErrorKind::Script, CLOSED))
        }
    }

    fn close_if_quiet_marker(&self, value: &str) {
        let marker = self.quiet_marker.lock().unwrap().clone();
        if marker.is_some_and(|marker| value.contains(&marker)) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn history_broken(&self) -> bool {
        *self.back_budget.lock().unwrap() == Some(0)
    }

    fn load(&self, url: &str, html: String) -> Result<(), BrowserError> {
        self.visited.lock().unwrap().insert(url.to_string());
        self.inner.load_html(url, html)
    }

    fn routed(&self, url: &str) -> Option<String> {
        self.routes.lock().unwrap().get(url).cloned()
    }
}

#[async_trait]
impl BrowserPage for ScriptedPage {
    type Element = StaticElement;

    async fn goto(&self, url: &str, _timeout: Duration) -> Result<(), BrowserError> {
        self.ensure_open()?;
        if self.history_broken() && self.visited.lock().unwrap().contains(url) {
            return Err(BrowserError::new(
                BrowserErrorKind::Navigation,
                format!("net::ERR_CONNECTION_RESET at {url}"),
            ));
        }
        match self.routed(url) {
            Some(html) => self.load(url, html),
            None => Err(BrowserError::new(
                BrowserErrorKind::Navigation,
                format!("net::ERR_NAME_NOT_RESOLVED at {url}"),
            )),
        }
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        self.ensure_open()?;
        self.inner.current_url().await
    }

    async fn go_back(&self, timeout: Duration) -> Result<(), BrowserError> {
        self.ensure_open()?;
        if let Some(budget) = self.back_budget.lock().unwrap().as_mut() {
            if *budget == 0 {
                return Err(BrowserError::new(
                    BrowserErrorKind::Navigation,
                    "history entry was discarded",
                ));
            }
            *budget -= 1;
        }
        self.inner.go_back(timeout).await
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<StaticElement>, BrowserError> {
        self.ensure_open()?;
        if self.stale_pending.swap(false, Ordering::SeqCst) {
            return Err(BrowserError::new(BrowserErrorKind::StaleElement, STALE));
        }
        self.inner.query_all(selector).await
    }

    async fn query_within(
        &self,
        scope: &StaticElement,
        selector: &str,
    ) -> Result<Vec<StaticElement>, BrowserError> {
        self.ensure_open()?;
        self.inner.query_within(scope, selector).await
    }

    async fn inner_text(&self, element: &StaticElement) -> Result<String, BrowserError> {
        self.ensure_open()?;
        let text = self.inner.inner_text(element).await?;
        let marker = self.terminate_marker.lock().unwrap().clone();
        if marker.is_some_and(|marker| text.contains(&marker)) {
            self.closed.store(true, Ordering::SeqCst);
            return Err(BrowserError::new(BrowserErrorKind::Script, CLOSED));
        }
        self.close_if_quiet_marker(&text);
        Ok(text)
    }

    async fn attribute(
        &self,
        element: &StaticElement,
        name: &str,
    ) -> Result<Option<String>, BrowserError> {
        self.ensure_open()?;
        let value = self.inner.attribute(element, name).await?;
        if let Some(value) = &value {
            self.close_if_quiet_marker(value);
        }
        Ok(value)
    }

    async fn is_visible(&self, element: &StaticElement) -> Result<bool, BrowserError> {
        self.ensure_open()?;
        self.inner.is_visible(element).await
    }

    async fn click(&self, element: &StaticElement) -> Result<(), BrowserError> {
        self.ensure_open()?;
        self.clicks.fetch_add(1, Ordering::SeqCst);
        if self.stale_after_click.load(Ordering::SeqCst) {
            self.stale_pending.store(true, Ordering::SeqCst);
        }
        let current = self.inner.current_url().await?;

        if let Some(key) = self.inner.attribute(element, "data-swap").await? {
            let html = self.swaps.lock().unwrap().get(&key).cloned();
            return match html {
                Some(html) => self.inner.load_html(current, html),
                None => Ok(()),
            };
        }
        let target = match self.inner.attribute(element, "data-goto").await? {
            Some(url) => Some(url),
            None => self
                .inner
                .attribute(element, "href")
                .await?
                .map(|href| jobscout_engine::resolve_href(&current, &href)),
        };
        match target.and_then(|url| self.routed(&url).map(|html| (url, html))) {
            Some((url, html)) => self.load(&url, html),
            None => Err(BrowserError::new(
                BrowserErrorKind::Unsupported,
                "element does nothing when clicked",
            )),
        }
    }

    async fn scroll_into_view(&self, element: &StaticElement) -> Result<(), BrowserError> {
        self.ensure_open()?;
        self.inner.scroll_into_view(element).await
    }

    async fn scroll_to_bottom(&self) -> Result<(), BrowserError> {
        self.ensure_open()?;
        self.scrolls.fetch_add(1, Ordering::SeqCst);
        let frame = self.scroll_frames.lock().unwrap().pop_front();
        if let Some(html) = frame {
            let current = self.inner.current_url().await?;
            self.inner.load_html(current, html)?;
        }
        Ok(())
    }

    async fn hide(&self, element: &StaticElement) -> Result<(), BrowserError> {
        self.ensure_open()?;
        self.inner.hide(element).await
    }

    async fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Listing card with a title, a location and a link to `/jobs/{id}`.
pub fn card(id: usize, title: &str) -> String {
    format!(
        "<li class=\"job\"><h3 class=\"title\">{title}</h3>\
         <span class=\"loc\">Pune, India</span>\
         <a class=\"link\" href=\"/jobs/{id}\">View</a></li>"
    )
}

pub fn cards(range: std::ops::Range<usize>) -> String {
    range.map(|id| card(id, &format!("Engineer {id}"))).collect()
}

pub fn listing(cards_html: &str, controls: &str) -> String {
    format!("<html><body><ul class=\"jobs\">{cards_html}</ul>{controls}</body></html>")
}

pub fn listing_config() -> SelectorConfig {
    let mut config = SelectorConfig::new("Acme", SITE, ".job");
    config.title_selector = ".title".into();
    config.location_selector = ".loc".into();
    config.link_selector = "a.link".into();
    config.cookie_handling = false;
    config
}

/// Settings with short waits; tests run on paused time anyway.
pub fn fast_settings() -> CrawlSettings {
    let mut settings = CrawlSettings::default();
    settings.wait.card_timeout = Duration::from_secs(1);
    settings.wait.url_change_timeout = Duration::from_secs(1);
    settings.wait.detail_container_timeout = Duration::from_secs(1);
    settings.wait.detail_text_timeout = Duration::from_secs(1);
    settings.detail_min_text_chars = 10;
    settings
}
