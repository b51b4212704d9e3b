use std::time::Duration;

use jobscout_core::PaginationLimits;

use crate::cookies::CookieStrategy;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Bounded waits. Every wait that expires logs a warning and the session
/// proceeds, except navigation, which fails the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitSettings {
    pub navigation_timeout: Duration,
    pub card_timeout: Duration,
    /// Pause after a pagination click or url navigation before recounting.
    pub after_advance: Duration,
    pub url_change_timeout: Duration,
    /// Fallback delay when a detail click does not change the url.
    pub settle_delay: Duration,
    pub detail_container_timeout: Duration,
    pub detail_text_timeout: Duration,
    /// Pause after `go_back` before waiting for cards again.
    pub restore_delay: Duration,
    pub load_more_delay: Duration,
    pub cookie_settle: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(30),
            card_timeout: Duration::from_secs(10),
            after_advance: Duration::from_secs(1),
            url_change_timeout: Duration::from_secs(5),
            settle_delay: Duration::from_millis(1500),
            detail_container_timeout: Duration::from_secs(10),
            detail_text_timeout: Duration::from_secs(15),
            restore_delay: Duration::from_secs(1),
            load_more_delay: Duration::from_millis(1500),
            cookie_settle: Duration::from_secs(1),
            poll_interval: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrawlSettings {
    pub wait: WaitSettings,
    pub limits: PaginationLimits,
    pub cookie_strategy: CookieStrategy,
    /// Cookie banners are re-checked every this many cards.
    pub cookie_recheck_every: usize,
    /// A detail container counts as loaded once its text exceeds this.
    pub detail_min_text_chars: usize,
    pub description_max_chars: usize,
    pub requirements_max_chars: usize,
    pub user_agent: String,
    /// Wall-clock budget per session; `None` for unbounded.
    pub session_timeout: Option<Duration>,
    pub concurrency: usize,
    /// Fetch each apply link and keep its main text as `detail_info`.
    pub fetch_apply_pages: bool,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            wait: WaitSettings::default(),
            limits: PaginationLimits::default(),
            cookie_strategy: CookieStrategy::HideAndAccept,
            cookie_recheck_every: 10,
            detail_min_text_chars: 100,
            description_max_chars: 5000,
            requirements_max_chars: 3000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            session_timeout: None,
            concurrency: 1,
            fetch_apply_pages: false,
        }
    }
}
