//! [`BrowserPage`] over plain HTTP and parsed HTML. No scripts run: links
//! navigate when clicked, anything else that needs a real browser reports
//! an unsupported operation, and scrolling never loads more content.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ego_tree::iter::Edge;
use ego_tree::NodeId;
use engine_logging::engine_debug;
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

use crate::decode::decode_html;
use crate::fetch::Fetcher;
use crate::{BrowserError, BrowserErrorKind, BrowserPage};

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr",
    "li", "main", "nav", "ol", "p", "pre", "section", "table", "tr", "ul",
];

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Handle into one loaded document. Any navigation makes it stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StaticElement {
    generation: u64,
    node: NodeId,
}

#[derive(Debug, Clone)]
struct LoadedDocument {
    url: String,
    html: String,
}

#[derive(Debug, Default)]
struct PageState {
    current: Option<LoadedDocument>,
    history: Vec<LoadedDocument>,
    generation: u64,
    hidden: HashSet<NodeId>,
}

pub struct StaticPage {
    fetcher: Arc<dyn Fetcher>,
    state: Mutex<PageState>,
}

impl StaticPage {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            state: Mutex::new(PageState::default()),
        }
    }

    pub fn load_html(&self, url: impl Into<String>, html: impl Into<String>) -> Result<(), BrowserError> {
        self.replace_document(
            LoadedDocument {
                url: url.into(),
                html: html.into(),
            },
            true,
        )
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, PageState>, BrowserError> {
        self.state
            .lock()
            .map_err(|_| BrowserError::new(BrowserErrorKind::Script, "page state lock poisoned"))
    }

    fn replace_document(&self, document: LoadedDocument, keep_history: bool) -> Result<(), BrowserError> {
        let mut state = self.lock()?;
        if let Some(previous) = state.current.take() {
            if keep_history {
                state.history.push(previous);
            }
        }
        state.current = Some(document);
        state.generation += 1;
        state.hidden.clear();
        Ok(())
    }

    /// Runs `read` against a fresh parse of the current document. Parsing the
    /// same source always yields the same node ids, so handles stay valid
    /// until the next navigation.
    fn with_document<T>(
        &self,
        read: impl FnOnce(&PageState, &Html) -> Result<T, BrowserError>,
    ) -> Result<T, BrowserError> {
        let state = self.lock()?;
        let html = state
            .current
            .as_ref()
            .map(|doc| doc.html.as_str())
            .unwrap_or_default();
        let document = Html::parse_document(html);
        read(&state, &document)
    }

    fn with_element<T>(
        &self,
        element: &StaticElement,
        read: impl FnOnce(&PageState, ElementRef<'_>) -> Result<T, BrowserError>,
    ) -> Result<T, BrowserError> {
        self.with_document(|state, document| {
            let found = resolve(state, document, element)?;
            read(state, found)
        })
    }
}

fn parse_selector(selector: &str) -> Result<Selector, BrowserError> {
    Selector::parse(selector).map_err(|err| {
        BrowserError::new(
            BrowserErrorKind::InvalidSelector,
            format!("{selector}: {err}"),
        )
    })
}

fn resolve<'a>(
    state: &PageState,
    document: &'a Html,
    element: &StaticElement,
) -> Result<ElementRef<'a>, BrowserError> {
    if element.generation != state.generation {
        return Err(BrowserError::new(
            BrowserErrorKind::StaleElement,
            "element belongs to a previous document",
        ));
    }
    document
        .tree
        .get(element.node)
        .and_then(ElementRef::wrap)
        .ok_or_else(|| BrowserError::new(BrowserErrorKind::StaleElement, "element not found"))
}

fn handles<'a>(state: &PageState, found: impl Iterator<Item = ElementRef<'a>>) -> Vec<StaticElement> {
    found
        .map(|element| StaticElement {
            generation: state.generation,
            node: element.id(),
        })
        .collect()
}

/// Approximates `innerText`: block elements break lines, runs of
/// whitespace collapse, script and style content is dropped.
pub fn rendered_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    let mut skipping = 0usize;
    for edge in element.traverse() {
        match edge {
            Edge::Open(node) => match node.value() {
                Node::Element(el) if SKIPPED_TAGS.contains(&el.name()) => skipping += 1,
                Node::Element(el) if BLOCK_TAGS.contains(&el.name()) => raw.push('\n'),
                Node::Text(text) if skipping == 0 => raw.push_str(text),
                _ => {}
            },
            Edge::Close(node) => match node.value() {
                Node::Element(el) if SKIPPED_TAGS.contains(&el.name()) => {
                    skipping = skipping.saturating_sub(1)
                }
                Node::Element(el) if BLOCK_TAGS.contains(&el.name()) => raw.push('\n'),
                _ => {}
            },
        }
    }
    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn hidden_by_markup(element: ElementRef<'_>) -> bool {
    let el = element.value();
    if el.attr("hidden").is_some() {
        return true;
    }
    if el.name() == "input" && el.attr("type") == Some("hidden") {
        return true;
    }
    el.attr("style").is_some_and(|style| {
        let style: String = style.split_whitespace().collect::<String>().to_ascii_lowercase();
        style.contains("display:none") || style.contains("visibility:hidden")
    })
}

fn is_element_visible(state: &PageState, element: ElementRef<'_>) -> bool {
    let mut current = Some(element);
    while let Some(el) = current {
        if state.hidden.contains(&el.id()) || hidden_by_markup(el) {
            return false;
        }
        current = el.parent().and_then(ElementRef::wrap);
    }
    true
}

/// `href` of the element or its nearest link ancestor.
fn link_target(element: ElementRef<'_>) -> Option<String> {
    let mut current = Some(element);
    while let Some(el) = current {
        if el.value().name() == "a" {
            if let Some(href) = el.value().attr("href") {
                return Some(href.to_string());
            }
        }
        current = el.parent().and_then(ElementRef::wrap);
    }
    None
}

fn unsupported(what: &str) -> BrowserError {
    BrowserError::new(
        BrowserErrorKind::Unsupported,
        format!("{what} needs a scripted browser"),
    )
}

#[async_trait]
impl BrowserPage for StaticPage {
    type Element = StaticElement;

    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        let output = tokio::time::timeout(timeout, self.fetcher.fetch(url))
            .await
            .map_err(|_| {
                BrowserError::new(
                    BrowserErrorKind::Timeout,
                    format!("loading {url} took longer than {timeout:?}"),
                )
            })??;
        let decoded = decode_html(&output.bytes, output.metadata.content_type.as_deref())?;
        engine_debug!(
            "Loaded {} as {} ({} bytes)",
            output.metadata.final_url,
            decoded.encoding_label,
            output.metadata.byte_len
        );
        self.replace_document(
            LoadedDocument {
                url: output.metadata.final_url,
                html: decoded.html,
            },
            true,
        )
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        let state = self.lock()?;
        Ok(state
            .current
            .as_ref()
            .map(|doc| doc.url.clone())
            .unwrap_or_default())
    }

    async fn go_back(&self, _timeout: Duration) -> Result<(), BrowserError> {
        let previous = self.lock()?.history.pop();
        match previous {
            Some(document) => self.replace_document(document, false),
            None => Err(BrowserError::new(
                BrowserErrorKind::Navigation,
                "no previous page in history",
            )),
        }
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<StaticElement>, BrowserError> {
        let selector = parse_selector(selector)?;
        self.with_document(|state, document| Ok(handles(state, document.select(&selector))))
    }

    async fn query_within(
        &self,
        scope: &StaticElement,
        selector: &str,
    ) -> Result<Vec<StaticElement>, BrowserError> {
        let selector = parse_selector(selector)?;
        self.with_element(scope, |state, scope| Ok(handles(state, scope.select(&selector))))
    }

    async fn inner_text(&self, element: &StaticElement) -> Result<String, BrowserError> {
        self.with_element(element, |_, found| Ok(rendered_text(found)))
    }

    async fn attribute(
        &self,
        element: &StaticElement,
        name: &str,
    ) -> Result<Option<String>, BrowserError> {
        self.with_element(element, |_, found| {
            Ok(found.value().attr(name).map(str::to_string))
        })
    }

    async fn is_visible(&self, element: &StaticElement) -> Result<bool, BrowserError> {
        self.with_element(element, |state, found| Ok(is_element_visible(state, found)))
    }

    async fn click(&self, element: &StaticElement) -> Result<(), BrowserError> {
        let (base, href) = self.with_element(element, |state, found| {
            let base = state.current.as_ref().map(|doc| doc.url.clone());
            Ok((base, link_target(found)))
        })?;
        let href = href.ok_or_else(|| unsupported("clicking a non-link element"))?;
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
            return Err(unsupported("following a script link"));
        }
        let target = base
            .and_then(|base| Url::parse(&base).ok())
            .and_then(|base| base.join(href).ok())
            .map(String::from)
            .unwrap_or_else(|| href.to_string());
        self.goto(&target, Duration::from_secs(30)).await
    }

    async fn scroll_into_view(&self, element: &StaticElement) -> Result<(), BrowserError> {
        self.with_element(element, |_, _| Ok(()))
    }

    async fn scroll_to_bottom(&self) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn hide(&self, element: &StaticElement) -> Result<(), BrowserError> {
        let mut state = self.lock()?;
        if element.generation != state.generation {
            return Err(BrowserError::new(
                BrowserErrorKind::StaleElement,
                "element belongs to a previous document",
            ));
        }
        state.hidden.insert(element.node);
        Ok(())
    }

    async fn is_closed(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::ReqwestFetcher;

    fn page_with(html: &str) -> StaticPage {
        let page = StaticPage::new(Arc::new(ReqwestFetcher::default()));
        page.load_html("https://jobs.example/list", html).unwrap();
        page
    }

    #[tokio::test]
    async fn rendered_text_breaks_blocks_and_skips_scripts() {
        let page = page_with(
            "<div class='meta'><span>Locations</span><div>India</div>\
             <script>var x = 1;</script><p>Posted  07/16/2025</p></div>",
        );
        let meta = page.query_all(".meta").await.unwrap();
        let text = page.inner_text(&meta[0]).await.unwrap();
        assert_eq!(text, "Locations\nIndia\nPosted 07/16/2025");
    }

    #[tokio::test]
    async fn handles_go_stale_after_navigation() {
        let page = page_with("<ul><li class='job'>A</li></ul>");
        let cards = page.query_all(".job").await.unwrap();
        page.load_html("https://jobs.example/other", "<li class='job'>B</li>")
            .unwrap();
        let err = page.inner_text(&cards[0]).await.unwrap_err();
        assert_eq!(err.kind, BrowserErrorKind::StaleElement);
        assert!(!err.is_session_terminated());
    }

    #[tokio::test]
    async fn hidden_ancestors_hide_descendants() {
        let page = page_with("<div id='banner' class='cookie-banner'><button>Accept</button></div>");
        let buttons = page.query_all("button").await.unwrap();
        assert!(page.is_visible(&buttons[0]).await.unwrap());
        let banner = page.query_all("#banner").await.unwrap();
        page.hide(&banner[0]).await.unwrap();
        assert!(!page.is_visible(&buttons[0]).await.unwrap());
    }

    #[tokio::test]
    async fn clicking_plain_buttons_is_unsupported() {
        let page = page_with("<button class='load-more'>More</button>");
        let button = page.query_all(".load-more").await.unwrap();
        let err = page.click(&button[0]).await.unwrap_err();
        assert_eq!(err.kind, BrowserErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn go_back_without_history_fails() {
        let page = page_with("<p>only page</p>");
        let err = page.go_back(Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err.kind, BrowserErrorKind::Navigation);
    }
}
