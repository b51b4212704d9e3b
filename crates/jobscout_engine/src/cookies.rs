//! Cookie banner suppression from static selector rules. Purely best effort:
//! every failure is logged and the crawl continues.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use engine_logging::{engine_debug, engine_info};
use serde::Serialize;

use crate::{BrowserError, BrowserPage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CookieStrategy {
    HideOnly,
    ClickOnly,
    HideAndAccept,
    HideAndReject,
}

impl CookieStrategy {
    fn hides(self) -> bool {
        matches!(self, Self::HideOnly | Self::HideAndAccept | Self::HideAndReject)
    }

    fn click_intent(self) -> Option<ButtonIntent> {
        match self {
            Self::HideOnly => None,
            Self::ClickOnly => Some(ButtonIntent::Close),
            Self::HideAndAccept => Some(ButtonIntent::Accept),
            Self::HideAndReject => Some(ButtonIntent::Reject),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown cookie strategy `{0}` (expected hide_only, click_only, hide_and_accept or hide_and_reject)")]
pub struct UnknownCookieStrategy(pub String);

impl FromStr for CookieStrategy {
    type Err = UnknownCookieStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "hide_only" => Ok(Self::HideOnly),
            "click_only" => Ok(Self::ClickOnly),
            "hide_and_accept" => Ok(Self::HideAndAccept),
            "hide_and_reject" => Ok(Self::HideAndReject),
            other => Err(UnknownCookieStrategy(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CookieSuppressionResult {
    pub detected: usize,
    pub hidden: usize,
    pub clicked: usize,
}

/// One banner match. Indicator classes on `<body>` show up as `body.<class>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BannerInfo {
    pub selector: String,
    pub visible: bool,
}

#[async_trait]
pub trait CookieSuppressor<P: BrowserPage + 'static>: Send + Sync {
    async fn detect_banners(&self, page: &P) -> Result<Vec<BannerInfo>, BrowserError>;

    async fn suppress(
        &self,
        page: &P,
        strategy: CookieStrategy,
    ) -> Result<CookieSuppressionResult, BrowserError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ButtonIntent {
    Accept,
    Reject,
    Close,
}

/// A consent button: a selector, optionally narrowed by its visible text.
struct ButtonRule {
    selector: &'static str,
    text: Option<&'static str>,
    intent: ButtonIntent,
}

const fn button(selector: &'static str, intent: ButtonIntent) -> ButtonRule {
    ButtonRule {
        selector,
        text: None,
        intent,
    }
}

const fn labelled(text: &'static str, intent: ButtonIntent) -> ButtonRule {
    ButtonRule {
        selector: "button",
        text: Some(text),
        intent,
    }
}

const BANNER_SELECTORS: &[&str] = &[
    "#stickyCookieBar",
    "#sliding-popup.sliding-popup-bottom",
    "#cookie_bar_top",
    "#cookielaw:not(.modal)",
    "#cookiePolicy:not(.reveal):not(.modal)",
    "#cookieBanner",
    "#cookieNotification",
    "#cookieOverlay",
    "#cookiesToolbar",
    "#privacy_notice",
    "#cookie_consent",
    "#cookieNotice",
    "#cookiebox",
    "#cookie-bar",
    "#cookie-notice-wrapper",
    "#cc-notification",
    "#cookieLaw",
    "#onetrust-consent-sdk",
    "#usercentrics-root",
    "[class*='cookie'][class*='banner']",
    "[class*='cookie'][class*='notice']",
    "[class*='cookie'][class*='bar']",
    "[class*='consent'][class*='banner']",
    "[class*='privacy'][class*='notice']",
    "[id*='cookie'][id*='banner']",
    "[id*='cookie'][id*='notice']",
    "[id*='consent'][id*='modal']",
    "[class*='gdpr']",
    ".privacy-banner",
    ".gdpr-banner",
    ".consent-banner",
    "[role='dialog'][aria-label*='cookie' i]",
    "[role='dialog'][aria-label*='consent' i]",
    ".modal[class*='cookie']",
    ".overlay[class*='cookie']",
    ".popup[class*='cookie']",
];

const BUTTON_RULES: &[ButtonRule] = &[
    button("#onetrust-accept-btn-handler", ButtonIntent::Accept),
    button("#accept-recommended-btn-handler", ButtonIntent::Accept),
    button("#onetrust-reject-all-handler", ButtonIntent::Reject),
    button(".ot-pc-refuse-all-handler", ButtonIntent::Reject),
    button("[data-testid='uc-accept-all-button']", ButtonIntent::Accept),
    button("[data-testid='uc-deny-all-button']", ButtonIntent::Reject),
    button("button[class*='accept' i][class*='cookie' i]", ButtonIntent::Accept),
    button("button[class*='accept' i][class*='consent' i]", ButtonIntent::Accept),
    button("button[id*='accept' i][id*='cookie' i]", ButtonIntent::Accept),
    button("button[class*='reject' i][class*='cookie' i]", ButtonIntent::Reject),
    button("button[class*='decline' i][class*='cookie' i]", ButtonIntent::Reject),
    button("button[id*='reject' i][id*='cookie' i]", ButtonIntent::Reject),
    labelled("Accept All", ButtonIntent::Accept),
    labelled("Accept Cookies", ButtonIntent::Accept),
    labelled("Accept", ButtonIntent::Accept),
    labelled("I Agree", ButtonIntent::Accept),
    labelled("Got it", ButtonIntent::Accept),
    labelled("Reject All", ButtonIntent::Reject),
    labelled("Decline", ButtonIntent::Reject),
    button("a[class*='close' i][class*='cookie' i]", ButtonIntent::Close),
    button("button.close", ButtonIntent::Close),
    button(".close-btn", ButtonIntent::Close),
    button("[aria-label='Close']", ButtonIntent::Close),
];

const BODY_COOKIE_CLASSES: &[&str] = &[
    "cookie-notification-active",
    "cookiewall",
    "cookie-guard",
    "with-cookie-bar",
    "has-cookie-bar",
    "has-cookie-banner",
    "privacypopup-open",
    "needsCookieAcceptance",
    "cookieoverlay-is-open",
    "cookiewall-active",
    "qc-cmp-ui-showing",
    "sp-message-open",
    "cli-barmodal-open",
];

/// [`CookieSuppressor`] over a fixed ruleset of banner and button selectors.
#[derive(Debug, Clone)]
pub struct RulesetCookieSuppressor {
    settle: Duration,
}

impl RulesetCookieSuppressor {
    pub fn new(settle: Duration) -> Self {
        Self { settle }
    }

    /// Every banner match plus body indicators, and the visible banner
    /// elements for hiding.
    async fn scan<P: BrowserPage>(
        &self,
        page: &P,
    ) -> Result<(Vec<BannerInfo>, Vec<P::Element>), BrowserError> {
        let mut found = Vec::new();
        let mut visible_elements = Vec::new();
        for selector in BANNER_SELECTORS {
            let elements = match page.query_all(selector).await {
                Ok(elements) => elements,
                Err(err) if err.is_session_terminated() => return Err(err),
                Err(err) => {
                    engine_debug!("Cookie selector '{}' failed: {}", selector, err);
                    continue;
                }
            };
            for element in elements {
                let visible = page.is_visible(&element).await.unwrap_or(false);
                found.push(BannerInfo {
                    selector: selector.to_string(),
                    visible,
                });
                if visible {
                    visible_elements.push(element);
                }
            }
        }
        found.extend(self.body_indicators(page).await?);
        Ok((found, visible_elements))
    }

    async fn body_indicators<P: BrowserPage>(
        &self,
        page: &P,
    ) -> Result<Vec<BannerInfo>, BrowserError> {
        let Some(body) = page.query_all("body").await?.into_iter().next() else {
            return Ok(Vec::new());
        };
        let classes = page.attribute(&body, "class").await?.unwrap_or_default();
        Ok(classes
            .split_whitespace()
            .filter(|class| BODY_COOKIE_CLASSES.contains(class))
            .map(|class| BannerInfo {
                selector: format!("body.{class}"),
                visible: true,
            })
            .collect())
    }

    /// Clicks the first visible button matching `intent`. Returns clicks made.
    async fn click_first<P: BrowserPage>(
        &self,
        page: &P,
        intent: ButtonIntent,
    ) -> Result<usize, BrowserError> {
        for rule in BUTTON_RULES.iter().filter(|rule| rule.intent == intent) {
            let candidates = match page.query_all(rule.selector).await {
                Ok(candidates) => candidates,
                Err(err) if err.is_session_terminated() => return Err(err),
                Err(_) => continue,
            };
            for candidate in candidates {
                if let Some(label) = rule.text {
                    let text = page.inner_text(&candidate).await.unwrap_or_default();
                    if !text.trim().eq_ignore_ascii_case(label) {
                        continue;
                    }
                }
                if !page.is_visible(&candidate).await.unwrap_or(false) {
                    continue;
                }
                match page.click(&candidate).await {
                    Ok(()) => {
                        engine_debug!("Clicked cookie button '{}'", rule.selector);
                        return Ok(1);
                    }
                    Err(err) if err.is_session_terminated() => return Err(err),
                    Err(err) => engine_debug!("Cookie button '{}' click failed: {}", rule.selector, err),
                }
            }
        }
        Ok(0)
    }
}

impl Default for RulesetCookieSuppressor {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl<P: BrowserPage + 'static> CookieSuppressor<P> for RulesetCookieSuppressor {
    async fn detect_banners(&self, page: &P) -> Result<Vec<BannerInfo>, BrowserError> {
        Ok(self.scan(page).await?.0)
    }

    async fn suppress(
        &self,
        page: &P,
        strategy: CookieStrategy,
    ) -> Result<CookieSuppressionResult, BrowserError> {
        let (found, banners) = self.scan(page).await?;
        let mut result = CookieSuppressionResult {
            detected: found.iter().filter(|banner| banner.visible).count(),
            ..CookieSuppressionResult::default()
        };
        if result.detected == 0 {
            return Ok(result);
        }

        if let Some(intent) = strategy.click_intent() {
            result.clicked = self.click_first(page, intent).await?;
        }
        if strategy.hides() {
            for banner in &banners {
                match page.hide(banner).await {
                    Ok(()) => result.hidden += 1,
                    Err(err) if err.is_session_terminated() => return Err(err),
                    Err(err) => engine_debug!("Could not hide cookie banner: {}", err),
                }
            }
        }

        tokio::time::sleep(self.settle).await;
        engine_info!(
            "Cookie banners: {} detected, {} hidden, {} clicked",
            result.detected,
            result.hidden,
            result.clicked
        );
        Ok(result)
    }
}
