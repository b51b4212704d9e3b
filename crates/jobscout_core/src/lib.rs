//! Jobscout core: pure domain types and decision logic for the crawler.
//! Nothing in this crate performs IO.
mod config;
mod metadata;
mod pagination;
mod record;
mod selectors;
mod stats;
mod termination;

pub use config::{
    default_detail_selectors, load_company_configs, normalize_company, ConfigDefaults,
    ConfigError, PaginationType, SelectorConfig, DEFAULT_DETAIL_CONTAINER, DEFAULT_MAX_JOBS,
    DEFAULT_MAX_PAGES, DEFAULT_PAGINATION_PARAM, DEFAULT_PAGINATION_STEP, DEFAULT_SCROLL_PAUSE_MS,
};
pub use metadata::{parse_metadata, ParsedMetadata};
pub use pagination::{
    is_disabled_control, next_param_value, rewrite_page_param, update, LoadMoreCursor,
    PaginationCommand, PaginationLimits, PaginationMsg, PaginationPhase, PaginationState,
    ParamFamily, ScrollTracker, StopReason, LOAD_MORE_BATCH_SIZE, MAX_CONSECUTIVE_EMPTY_SCROLLS,
    MAX_LOAD_MORE_ATTEMPTS, MAX_SCROLL_ATTEMPTS,
};
pub use record::{collapse_whitespace, is_available, RawJobRecord, NOT_AVAILABLE};
pub use selectors::{
    click_target_chain, detail_field_chains, ClickTarget, FieldChain,
    GENERIC_APPLY_BUTTON_SELECTOR,
};
pub use stats::ExtractionStats;
pub use termination::is_session_terminated;
