mod support;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use jobscout_core::{PaginationType, SelectorConfig, StopReason};
use jobscout_engine::{DedupGate, InMemoryDedupStore, SessionController};
use pretty_assertions::assert_eq;
use support::{card, cards, fast_settings, listing, listing_config, ScriptedPage, SITE};
use tokio_util::sync::CancellationToken;

fn fresh_gate() -> DedupGate {
    DedupGate::new(Arc::new(InMemoryDedupStore::new()))
}

/// Cards without links; clicking one opens `/detail/{id}`.
fn analyst_cards(range: std::ops::Range<usize>) -> String {
    range
        .map(|id| {
            format!(
                "<li class=\"job\" data-goto=\"{SITE}/detail/{id}\"><h3 class=\"title\">Analyst {id}</h3></li>"
            )
        })
        .collect()
}

fn detail_page(id: usize) -> String {
    format!(
        "<html><body><div class=\"detail\"><p class=\"desc\">Build data pipelines for job {id}.</p>\
         <span class=\"pay\">INR 30L</span></div></body></html>"
    )
}

fn detail_config() -> SelectorConfig {
    let mut config = listing_config();
    config.link_selector = String::new();
    config.detail_container_selector = Some(".detail".into());
    config.detail_selectors = BTreeMap::from([
        ("description".to_string(), vec![".desc".to_string()]),
        ("salary".to_string(), vec![".missing".to_string(), ".pay".to_string()]),
    ]);
    config
}

#[tokio::test(start_paused = true)]
async fn single_page_session_collects_every_card() {
    let page = ScriptedPage::new().route(SITE, listing(&cards(0..3), ""));
    let config = listing_config();
    let settings = fast_settings();

    let outcome = SessionController::new(&page, &config, &settings, fresh_gate())
        .run()
        .await;

    assert_eq!(outcome.state.stop_reason, Some(StopReason::SinglePage));
    assert_eq!(outcome.records.len(), 3);
    let first = &outcome.records[0];
    assert_eq!(first.title, "Engineer 0");
    assert_eq!(first.location, "Pune, India");
    assert_eq!(first.apply_link, "https://careers.acme.example/jobs/0");
    assert_eq!(first.company, "Acme");
    assert_eq!(first.page_number, 1);
    assert_ne!(first.scraped_at, "N/A");
    assert_eq!(outcome.stats.successful_extractions, 3);
    assert_eq!(outcome.stats.cards_found, 3);
    assert!(outcome.errors.is_empty());
}

#[tokio::test(start_paused = true)]
async fn termination_mid_page_keeps_earlier_records() {
    let html: String = [card(0, "Engineer 0"), card(1, "Engineer 1"), card(2, "BOOM"), card(3, "Engineer 3")]
        .concat();
    let page = ScriptedPage::new()
        .route(SITE, listing(&html, ""))
        .terminate_on_text("BOOM");
    let config = listing_config();
    let settings = fast_settings();

    let outcome = SessionController::new(&page, &config, &settings, fresh_gate())
        .run()
        .await;

    assert!(outcome.stats.browser_closed_early);
    assert_eq!(outcome.state.stop_reason, Some(StopReason::SessionTerminated));
    let titles: Vec<&str> = outcome.records.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["Engineer 0", "Engineer 1"]);
    assert_eq!(outcome.errors.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn prepopulated_store_accepts_nothing() {
    let page = ScriptedPage::new().route(SITE, listing(&cards(0..3), ""));
    let config = listing_config();
    let settings = fast_settings();
    let store = InMemoryDedupStore::with_keys(
        (0..3).map(|id| format!("https://careers.acme.example/jobs/{id}")),
    );

    let outcome = SessionController::new(&page, &config, &settings, DedupGate::new(Arc::new(store)))
        .run()
        .await;

    assert!(outcome.records.is_empty());
    assert_eq!(outcome.stats.skipped_duplicates, 3);
    assert_eq!(outcome.stats.successful_extractions, 0);
}

#[tokio::test(start_paused = true)]
async fn second_run_over_shared_store_is_idempotent() {
    let store = Arc::new(InMemoryDedupStore::new());
    let config = listing_config();
    let settings = fast_settings();

    let first_page = ScriptedPage::new().route(SITE, listing(&cards(0..4), ""));
    let first = SessionController::new(&first_page, &config, &settings, DedupGate::new(store.clone()))
        .run()
        .await;
    let second_page = ScriptedPage::new().route(SITE, listing(&cards(0..4), ""));
    let second = SessionController::new(&second_page, &config, &settings, DedupGate::new(store.clone()))
        .run()
        .await;

    assert_eq!(first.records.len(), 4);
    assert_eq!(store.len(), 4);
    assert!(second.records.is_empty());
    assert_eq!(second.stats.skipped_duplicates, 4);
}

#[tokio::test(start_paused = true)]
async fn button_click_stops_quietly_on_disabled_control() {
    let page2 = format!("{SITE}?page=2");
    let page = ScriptedPage::new()
        .route(
            SITE,
            listing(&cards(0..3), &format!("<button class=\"next\" data-goto=\"{page2}\">Next</button>")),
        )
        .route(
            &page2,
            listing(&cards(3..5), "<button class=\"next\" disabled>Next</button>"),
        );
    let mut config = listing_config();
    config.pagination_type = PaginationType::ButtonClick;
    config.pagination_selector = ".next".into();
    let settings = fast_settings();

    let outcome = SessionController::new(&page, &config, &settings, fresh_gate())
        .run()
        .await;

    assert_eq!(outcome.state.stop_reason, Some(StopReason::ControlDisabled));
    assert_eq!(outcome.state.current_page, 2);
    assert_eq!(outcome.records.len(), 5);
    assert_eq!(outcome.records[4].page_number, 2);
    assert!(outcome.errors.is_empty());
}

#[tokio::test(start_paused = true)]
async fn stale_context_after_next_click_keeps_the_session_alive() {
    let page2 = format!("{SITE}?page=2");
    let page = ScriptedPage::new()
        .route(
            SITE,
            listing(&cards(0..3), &format!("<button class=\"next\" data-goto=\"{page2}\">Next</button>")),
        )
        .route(
            &page2,
            listing(&cards(3..5), "<button class=\"next\" disabled>Next</button>"),
        )
        .stale_after_click();
    let mut config = listing_config();
    config.pagination_type = PaginationType::ButtonClick;
    config.pagination_selector = ".next".into();
    let settings = fast_settings();

    let outcome = SessionController::new(&page, &config, &settings, fresh_gate())
        .run()
        .await;

    assert!(!outcome.stats.browser_closed_early);
    assert_eq!(outcome.state.stop_reason, Some(StopReason::ControlDisabled));
    assert_eq!(outcome.records.len(), 5);
    assert_eq!(outcome.records[3].title, "Engineer 3");
    assert_eq!(outcome.records[3].page_number, 2);
    assert!(outcome.errors.is_empty());
}

#[tokio::test(start_paused = true)]
async fn button_click_without_a_control_stops_after_the_first_page() {
    let page = ScriptedPage::new().route(SITE, listing(&cards(0..3), ""));
    let mut config = listing_config();
    config.pagination_type = PaginationType::ButtonClick;
    config.pagination_selector = ".next".into();
    let settings = fast_settings();

    let outcome = SessionController::new(&page, &config, &settings, fresh_gate())
        .run()
        .await;

    assert_eq!(outcome.state.stop_reason, Some(StopReason::ControlMissing));
    assert_eq!(outcome.state.current_page, 1);
    assert_eq!(outcome.records.len(), 3);
    assert_eq!(page.clicks(), 0);
    assert!(outcome.errors.is_empty());
}

#[tokio::test(start_paused = true)]
async fn infinite_scroll_stops_three_scrolls_after_growth_ends() {
    let page = ScriptedPage::new()
        .route(SITE, listing(&cards(0..2), ""))
        .scroll_frames(vec![listing(&cards(0..4), ""), listing(&cards(0..6), "")]);
    let mut config = listing_config();
    config.pagination_type = PaginationType::InfiniteScroll;
    config.scroll_pause_ms = 500;
    let settings = fast_settings();

    let outcome = SessionController::new(&page, &config, &settings, fresh_gate())
        .run()
        .await;

    assert_eq!(page.scrolls(), 2 + 3);
    assert_eq!(outcome.state.stop_reason, Some(StopReason::NoNewCards));
    assert_eq!(outcome.state.consecutive_no_progress, 3);
    assert_eq!(outcome.records.len(), 6);
}

#[tokio::test(start_paused = true)]
async fn infinite_scroll_never_exceeds_the_attempt_limit() {
    let frames = (1..40).map(|n| listing(&cards(0..n + 1), "")).collect();
    let page = ScriptedPage::new()
        .route(SITE, listing(&cards(0..1), ""))
        .scroll_frames(frames);
    let mut config = listing_config();
    config.pagination_type = PaginationType::InfiniteScroll;
    config.scroll_pause_ms = 100;
    let settings = fast_settings();

    let outcome = SessionController::new(&page, &config, &settings, fresh_gate())
        .run()
        .await;

    assert_eq!(page.scrolls(), 20);
    assert_eq!(outcome.state.stop_reason, Some(StopReason::ScrollLimitReached));
    assert_eq!(outcome.records.len(), 21);
}

#[tokio::test(start_paused = true)]
async fn url_param_walks_pages_until_one_is_empty() {
    let page = ScriptedPage::new()
        .route(SITE, listing(&cards(0..2), ""))
        .route(&format!("{SITE}?page=2"), listing(&cards(2..4), ""))
        .route(&format!("{SITE}?page=3"), listing("", ""));
    let mut config = listing_config();
    config.pagination_type = PaginationType::UrlParam;
    let settings = fast_settings();

    let outcome = SessionController::new(&page, &config, &settings, fresh_gate())
        .run()
        .await;

    assert_eq!(outcome.state.stop_reason, Some(StopReason::EmptyPage));
    assert_eq!(outcome.state.current_page, 2);
    assert_eq!(outcome.records.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn load_more_walks_batches_until_control_disables() {
    let page = ScriptedPage::new()
        .route(
            SITE,
            listing(&cards(0..3), "<button class=\"more\" data-swap=\"second\">More</button>"),
        )
        .swap(
            "second",
            listing(&cards(0..5), "<button class=\"more\" disabled>More</button>"),
        );
    let mut config = listing_config();
    config.pagination_type = PaginationType::LoadMoreProgressive;
    config.pagination_selector = ".more".into();
    let settings = fast_settings();

    let outcome = SessionController::new(&page, &config, &settings, fresh_gate())
        .run()
        .await;

    assert_eq!(outcome.state.stop_reason, Some(StopReason::ControlDisabled));
    assert_eq!(outcome.records.len(), 5);
    assert_eq!(page.clicks(), 1);
}

#[tokio::test(start_paused = true)]
async fn max_jobs_caps_the_session() {
    let page = ScriptedPage::new().route(SITE, listing(&cards(0..5), ""));
    let mut config = listing_config();
    config.max_jobs = 2;
    let settings = fast_settings();

    let outcome = SessionController::new(&page, &config, &settings, fresh_gate())
        .run()
        .await;

    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.state.stop_reason, Some(StopReason::MaxJobsReached));
}

#[tokio::test(start_paused = true)]
async fn detail_navigation_reads_the_container_and_restores_the_listing() {
    let page = ScriptedPage::new()
        .route(SITE, listing(&analyst_cards(0..2), ""))
        .route(&format!("{SITE}/detail/0"), detail_page(0))
        .route(&format!("{SITE}/detail/1"), detail_page(1));
    let config = detail_config();
    let settings = fast_settings();

    let outcome = SessionController::new(&page, &config, &settings, fresh_gate())
        .run()
        .await;

    assert_eq!(outcome.records.len(), 2);
    let second = &outcome.records[1];
    assert_eq!(second.title, "Analyst 1");
    assert_eq!(second.apply_link, format!("{SITE}/detail/1"));
    assert_eq!(second.description, "Build data pipelines for job 1.");
    assert_eq!(second.salary, "INR 30L");
    assert!(second.detail_info.starts_with("Build data pipelines"));
    assert_eq!(outcome.stats.detail_errors, 0);
    assert_eq!(outcome.state.stop_reason, Some(StopReason::SinglePage));
}

#[tokio::test(start_paused = true)]
async fn failed_restore_stops_the_session_and_keeps_earlier_records() {
    let page = ScriptedPage::new()
        .route(SITE, listing(&analyst_cards(0..3), ""))
        .route(&format!("{SITE}/detail/0"), detail_page(0))
        .route(&format!("{SITE}/detail/1"), detail_page(1))
        .history_breaks_after(1);
    let config = detail_config();
    let settings = fast_settings();

    let outcome = SessionController::new(&page, &config, &settings, fresh_gate())
        .run()
        .await;

    assert_eq!(outcome.state.stop_reason, Some(StopReason::NavigationFailed));
    let titles: Vec<&str> = outcome.records.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["Analyst 0"]);
    assert!(!outcome.stats.browser_closed_early);
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].starts_with(&format!("could not restore listing {SITE}")));
}

#[tokio::test(start_paused = true)]
async fn load_more_with_detail_pages_reresolves_cards_after_each_visit() {
    let mut page = ScriptedPage::new()
        .route(
            SITE,
            listing(&analyst_cards(0..3), "<button class=\"more\" data-swap=\"more\">More</button>"),
        )
        .swap(
            "more",
            listing(&analyst_cards(0..5), "<button class=\"more\" disabled>More</button>"),
        );
    for id in 0..5 {
        page = page.route(&format!("{SITE}/detail/{id}"), detail_page(id));
    }
    let mut config = detail_config();
    config.pagination_type = PaginationType::LoadMoreProgressive;
    config.pagination_selector = ".more".into();
    let settings = fast_settings();

    let outcome = SessionController::new(&page, &config, &settings, fresh_gate())
        .run()
        .await;

    assert_eq!(outcome.state.stop_reason, Some(StopReason::ControlDisabled));
    let visited: Vec<(String, String)> = outcome
        .records
        .iter()
        .map(|r| (r.title.clone(), r.apply_link.clone()))
        .collect();
    let expected: Vec<(String, String)> = (0..5)
        .map(|id| (format!("Analyst {id}"), format!("{SITE}/detail/{id}")))
        .collect();
    assert_eq!(visited, expected);
    assert!(outcome.errors.is_empty());
}

#[tokio::test(start_paused = true)]
async fn page_closed_between_cards_ends_the_session_without_touching_it() {
    let quiet = "<li class=\"job\"><h3 class=\"title\">Engineer 2</h3>\
                 <a class=\"link\" href=\"/jobs/quiet\">View</a></li>";
    let html = [cards(0..2), quiet.to_string(), cards(3..5)].concat();
    let page = ScriptedPage::new()
        .route(SITE, listing(&html, ""))
        .close_quietly_on("/jobs/quiet");
    let config = listing_config();
    let settings = fast_settings();

    let outcome = SessionController::new(&page, &config, &settings, fresh_gate())
        .run()
        .await;

    assert!(outcome.stats.browser_closed_early);
    assert_eq!(outcome.state.stop_reason, Some(StopReason::SessionTerminated));
    let titles: Vec<&str> = outcome.records.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["Engineer 0", "Engineer 1", "Engineer 2"]);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(page.calls_after_close(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancelled_session_returns_what_it_has() {
    let page = ScriptedPage::new().route(SITE, listing(&cards(0..3), ""));
    let config = listing_config();
    let settings = fast_settings();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = SessionController::new(&page, &config, &settings, fresh_gate())
        .with_cancellation(cancel)
        .run()
        .await;

    assert_eq!(outcome.state.stop_reason, Some(StopReason::Cancelled));
    assert!(outcome.records.is_empty());
}

#[tokio::test(start_paused = true)]
async fn session_budget_abandons_a_slow_scroll() {
    let page = ScriptedPage::new()
        .route(SITE, listing(&cards(0..2), ""))
        .scroll_frames(vec![listing(&cards(0..4), "")]);
    let mut config = listing_config();
    config.pagination_type = PaginationType::InfiniteScroll;
    config.scroll_pause_ms = 60_000;
    let mut settings = fast_settings();
    settings.session_timeout = Some(Duration::from_secs(5));

    let outcome = SessionController::new(&page, &config, &settings, fresh_gate())
        .run()
        .await;

    assert_eq!(outcome.state.stop_reason, Some(StopReason::Cancelled));
    assert!(outcome.records.is_empty());
    assert_eq!(page.scrolls(), 1);
}
