//! The browser seam. Everything the crawler does to a page goes through
//! [`BrowserPage`], so sessions run the same against a real browser, the
//! static HTML backend or a scripted test double.

use std::time::Duration;

use async_trait::async_trait;
use engine_logging::engine_warn;
use tokio::time::Instant;

use crate::BrowserError;

#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Handle to an element of the current document. Handles may go stale
    /// after any DOM-mutating action and must then be re-resolved.
    type Element: Send + Sync;

    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), BrowserError>;

    async fn current_url(&self) -> Result<String, BrowserError>;

    async fn go_back(&self, timeout: Duration) -> Result<(), BrowserError>;

    async fn query_all(&self, selector: &str) -> Result<Vec<Self::Element>, BrowserError>;

    async fn query_within(
        &self,
        scope: &Self::Element,
        selector: &str,
    ) -> Result<Vec<Self::Element>, BrowserError>;

    async fn inner_text(&self, element: &Self::Element) -> Result<String, BrowserError>;

    async fn attribute(
        &self,
        element: &Self::Element,
        name: &str,
    ) -> Result<Option<String>, BrowserError>;

    async fn is_visible(&self, element: &Self::Element) -> Result<bool, BrowserError>;

    async fn click(&self, element: &Self::Element) -> Result<(), BrowserError>;

    async fn scroll_into_view(&self, element: &Self::Element) -> Result<(), BrowserError>;

    async fn scroll_to_bottom(&self) -> Result<(), BrowserError>;

    /// Removes an element from view without touching the rest of the page.
    async fn hide(&self, element: &Self::Element) -> Result<(), BrowserError>;

    async fn is_closed(&self) -> bool;
}

pub async fn query_first_within<P: BrowserPage>(
    page: &P,
    scope: &P::Element,
    selector: &str,
) -> Result<Option<P::Element>, BrowserError> {
    Ok(page.query_within(scope, selector).await?.into_iter().next())
}

pub async fn count_matching<P: BrowserPage>(page: &P, selector: &str) -> Result<usize, BrowserError> {
    Ok(page.query_all(selector).await?.len())
}

/// Polls until `selector` matches at least one element. Returns `false`
/// when the timeout expires first.
pub async fn wait_for_selector<P: BrowserPage>(
    page: &P,
    selector: &str,
    timeout: Duration,
    poll: Duration,
) -> Result<bool, BrowserError> {
    let deadline = Instant::now() + timeout;
    loop {
        if count_matching(page, selector).await? > 0 {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(poll).await;
    }
}

/// Same as [`wait_for_selector`], but an expired wait only logs a warning.
pub async fn wait_for_cards<P: BrowserPage>(
    page: &P,
    card_selector: &str,
    timeout: Duration,
    poll: Duration,
) -> Result<(), BrowserError> {
    if !wait_for_selector(page, card_selector, timeout, poll).await? {
        engine_warn!(
            "Job cards '{}' not found within {:?}, continuing",
            card_selector,
            timeout
        );
    }
    Ok(())
}

/// Polls until the page url differs from `from`. Returns the new url, or
/// `None` when the timeout expires first.
pub async fn wait_for_url_change<P: BrowserPage>(
    page: &P,
    from: &str,
    timeout: Duration,
    poll: Duration,
) -> Result<Option<String>, BrowserError> {
    let deadline = Instant::now() + timeout;
    loop {
        let url = page.current_url().await?;
        if url != from {
            return Ok(Some(url));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        tokio::time::sleep(poll).await;
    }
}

/// Polls until the first `selector` match has more than `min_chars`
/// characters of text. Returns `false` when the timeout expires first.
pub async fn wait_for_text_len<P: BrowserPage>(
    page: &P,
    selector: &str,
    min_chars: usize,
    timeout: Duration,
    poll: Duration,
) -> Result<bool, BrowserError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(element) = page.query_all(selector).await?.into_iter().next() {
            if page.inner_text(&element).await?.chars().count() > min_chars {
                return Ok(true);
            }
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(poll).await;
    }
}
