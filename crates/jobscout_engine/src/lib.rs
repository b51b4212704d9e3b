//! Jobscout engine: browser seam, sessions and every piece of IO.
mod cookies;
mod decode;
mod dedup;
mod detail;
mod enrich;
mod extract;
mod fetch;
mod filename;
mod normalize;
mod page;
mod paginate;
mod persist;
mod report;
mod runner;
mod session;
mod settings;
mod static_page;
mod truncate;
mod types;

#[cfg(feature = "chromium")]
mod chromium;

#[cfg(feature = "chromium")]
pub use chromium::{ChromiumBrowser, ChromiumPage};
pub use cookies::{
    BannerInfo, CookieStrategy, CookieSuppressionResult, CookieSuppressor, RulesetCookieSuppressor,
    UnknownCookieStrategy,
};
pub use decode::{decode_html, DecodedHtml};
pub use dedup::{DedupGate, DedupStore, InMemoryDedupStore, StoreError};
pub use detail::{restore_listing, visit_detail, DetailError, DetailOutcome};
pub use enrich::{main_text, ApplyPageEnricher};
pub use extract::{extract_card, extract_field, extract_first_of, extract_href, resolve_href};
pub use fetch::{FetchSettings, Fetcher, ReqwestFetcher};
pub use filename::results_filename;
pub use normalize::{
    merge_normalized, normalize_or_raw, strip_code_fences, GeminiNormalizer, NoopNormalizer,
    NormalizeError, Normalizer, GEMINI_ENDPOINT, GEMINI_MODEL,
};
pub use page::{
    count_matching, query_first_within, wait_for_cards, wait_for_selector, wait_for_text_len,
    wait_for_url_change, BrowserPage,
};
pub use paginate::{advance, click_next_button, load_more, navigate_next_url, scroll_to_end};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use report::{RunResults, RunSummary, SessionReport, SessionStatus, SessionTiming};
pub use runner::{CrawlRunner, PageFactory, StaticPageFactory};
pub use session::{SessionController, SessionOutcome};
pub use settings::{CrawlSettings, WaitSettings, DEFAULT_USER_AGENT};
pub use static_page::{rendered_text, StaticElement, StaticPage};
pub use truncate::{cap_detail_field, truncate_chars};
pub use types::{
    BrowserError, BrowserErrorKind, FailureKind, FetchError, FetchMetadata, FetchOutput,
    SessionTerminated,
};
