//! Browser side of the pagination policies. Each driver performs one advance
//! and reports the outcome as a [`PaginationMsg`] for the core state machine.

use engine_logging::{engine_debug, engine_info, engine_warn};
use jobscout_core::{
    is_disabled_control, next_param_value, rewrite_page_param, LoadMoreCursor, PaginationMsg,
    PaginationState, PaginationType, ScrollTracker, SelectorConfig, StopReason,
};

use crate::page::{count_matching, wait_for_cards};
use crate::{BrowserError, BrowserPage, CrawlSettings, SessionTerminated};

/// Maps a failed browser action onto a stop reason, escalating termination.
fn stop_on(err: BrowserError, reason: StopReason) -> Result<PaginationMsg, SessionTerminated> {
    let err = err.escalate()?;
    engine_warn!("Pagination stopped ({:?}): {}", reason, err);
    Ok(PaginationMsg::AdvanceStopped(reason))
}

/// Waits for cards after an advance. A failed wait is logged and the session
/// carries on; only termination escapes.
async fn settle_cards<P: BrowserPage>(
    page: &P,
    config: &SelectorConfig,
    settings: &CrawlSettings,
) -> Result<(), SessionTerminated> {
    let wait = &settings.wait;
    if let Err(err) =
        wait_for_cards(page, &config.card_selector, wait.card_timeout, wait.poll_interval).await
    {
        let err = err.escalate()?;
        engine_warn!("Waiting for cards failed, continuing: {}", err);
    }
    Ok(())
}

pub async fn advance<P: BrowserPage>(
    page: &P,
    state: &PaginationState,
    config: &SelectorConfig,
    settings: &CrawlSettings,
) -> Result<PaginationMsg, SessionTerminated> {
    match state.policy {
        PaginationType::ButtonClick => click_next_button(page, config, settings).await,
        PaginationType::InfiniteScroll => scroll_to_end(page, config, settings).await,
        PaginationType::UrlParam => navigate_next_url(page, state.current_page, config, settings).await,
        PaginationType::None | PaginationType::LoadMoreProgressive => {
            Ok(PaginationMsg::AdvanceStopped(StopReason::SinglePage))
        }
    }
}

async fn control_disabled<P: BrowserPage>(
    page: &P,
    control: &P::Element,
) -> Result<bool, BrowserError> {
    let disabled = page.attribute(control, "disabled").await?;
    let class = page.attribute(control, "class").await?;
    let aria = page.attribute(control, "aria-disabled").await?;
    Ok(is_disabled_control(
        disabled.as_deref(),
        class.as_deref(),
        aria.as_deref(),
    ))
}

/// `button_click`: click the next-page control, then wait for cards.
pub async fn click_next_button<P: BrowserPage>(
    page: &P,
    config: &SelectorConfig,
    settings: &CrawlSettings,
) -> Result<PaginationMsg, SessionTerminated> {
    let control = match page.query_all(&config.pagination_selector).await {
        Ok(found) => found.into_iter().next(),
        Err(err) => return stop_on(err, StopReason::ControlMissing),
    };
    let Some(control) = control else {
        engine_info!("Next-page control '{}' not found", config.pagination_selector);
        return Ok(PaginationMsg::AdvanceStopped(StopReason::ControlMissing));
    };
    match control_disabled(page, &control).await {
        Ok(true) => {
            engine_info!("Next-page control is disabled, last page reached");
            return Ok(PaginationMsg::AdvanceStopped(StopReason::ControlDisabled));
        }
        Ok(false) => {}
        Err(err) => return stop_on(err, StopReason::ClickFailed),
    }

    if let Err(err) = page.scroll_into_view(&control).await {
        let err = err.escalate()?;
        engine_debug!("Could not scroll to next-page control: {}", err);
    }
    if let Err(err) = page.click(&control).await {
        return stop_on(err, StopReason::ClickFailed);
    }

    tokio::time::sleep(settings.wait.after_advance).await;
    settle_cards(page, config, settings).await?;
    Ok(PaginationMsg::Advanced)
}

/// `infinite_scroll`: scrolls until the card count stops growing, then
/// reports how loading ended. Extraction happens once, afterwards.
pub async fn scroll_to_end<P: BrowserPage>(
    page: &P,
    config: &SelectorConfig,
    settings: &CrawlSettings,
) -> Result<PaginationMsg, SessionTerminated> {
    let pause = std::time::Duration::from_millis(config.scroll_pause_ms);
    let initial = match count_matching(page, &config.card_selector).await {
        Ok(count) => count,
        Err(err) => return stop_on(err, StopReason::NoNewCards),
    };
    let mut tracker = ScrollTracker::new(initial, settings.limits);

    while tracker.should_scroll() {
        if let Err(err) = page.scroll_to_bottom().await {
            return stop_on(err, StopReason::NoNewCards);
        }
        tokio::time::sleep(pause).await;
        let count = match count_matching(page, &config.card_selector).await {
            Ok(count) => count,
            Err(err) => return stop_on(err, StopReason::NoNewCards),
        };
        if tracker.record_scroll(count) {
            engine_debug!("Scroll {} loaded cards, now {}", tracker.attempts(), count);
        }
    }

    engine_info!(
        "Scrolling finished after {} scrolls with {} cards",
        tracker.attempts(),
        tracker.last_count()
    );
    Ok(PaginationMsg::ScrollSettled {
        reason: tracker.stop_reason(),
        empty_scrolls: tracker.consecutive_no_progress(),
    })
}

/// `url_param`: rewrite the page parameter, navigate, and recount.
pub async fn navigate_next_url<P: BrowserPage>(
    page: &P,
    current_page: u32,
    config: &SelectorConfig,
    settings: &CrawlSettings,
) -> Result<PaginationMsg, SessionTerminated> {
    let current_url = match page.current_url().await {
        Ok(url) => url,
        Err(err) => return stop_on(err, StopReason::NavigationFailed),
    };
    let value = next_param_value(&config.pagination_param, current_page, config.pagination_step);
    let next_url = rewrite_page_param(&current_url, &config.pagination_param, value);
    engine_info!("Navigating to page {}: {}", current_page + 1, next_url);

    let wait = &settings.wait;
    if let Err(err) = page.goto(&next_url, wait.navigation_timeout).await {
        return stop_on(err, StopReason::NavigationFailed);
    }
    tokio::time::sleep(wait.after_advance).await;
    settle_cards(page, config, settings).await?;

    let count = match count_matching(page, &config.card_selector).await {
        Ok(count) => count,
        Err(err) => return stop_on(err, StopReason::NavigationFailed),
    };
    if count == 0 {
        engine_info!("No cards on {}, last page reached", next_url);
        return Ok(PaginationMsg::AdvanceStopped(StopReason::EmptyPage));
    }
    Ok(PaginationMsg::Advanced)
}

/// `load_more_progressive`: clicks the load-more control once. `None` means
/// new cards rendered; otherwise the reason loading is over.
pub async fn load_more<P: BrowserPage>(
    page: &P,
    cursor: &mut LoadMoreCursor,
    config: &SelectorConfig,
    settings: &CrawlSettings,
) -> Result<Option<StopReason>, SessionTerminated> {
    if !cursor.can_load_more() {
        engine_info!("Load-more limit of {} attempts reached", cursor.load_attempts());
        return Ok(Some(StopReason::LoadLimitReached));
    }

    let stop = |err: BrowserError, reason: StopReason| match stop_on(err, reason) {
        Ok(_) => Ok(Some(reason)),
        Err(terminated) => Err(terminated),
    };

    let before = match count_matching(page, &config.card_selector).await {
        Ok(count) => count,
        Err(err) => return stop(err, StopReason::NoNewCards),
    };
    let control = match page.query_all(&config.pagination_selector).await {
        Ok(found) => found.into_iter().next(),
        Err(err) => return stop(err, StopReason::ControlMissing),
    };
    let Some(control) = control else {
        engine_info!("Load-more control '{}' not found", config.pagination_selector);
        return Ok(Some(StopReason::ControlMissing));
    };

    let visible = match page.is_visible(&control).await {
        Ok(visible) => visible,
        Err(err) => return stop(err, StopReason::ControlMissing),
    };
    if !visible {
        engine_info!("Load-more control is hidden");
        return Ok(Some(StopReason::ControlMissing));
    }
    match control_disabled(page, &control).await {
        Ok(true) => {
            engine_info!("Load-more control is disabled");
            return Ok(Some(StopReason::ControlDisabled));
        }
        Ok(false) => {}
        Err(err) => return stop(err, StopReason::ClickFailed),
    }

    if let Err(err) = page.scroll_into_view(&control).await {
        err.escalate()?;
    }
    if let Err(err) = page.click(&control).await {
        return stop(err, StopReason::ClickFailed);
    }
    tokio::time::sleep(settings.wait.load_more_delay).await;

    let after = match count_matching(page, &config.card_selector).await {
        Ok(count) => count,
        Err(err) => return stop(err, StopReason::NoNewCards),
    };
    if cursor.record_load(before, after) {
        engine_info!("Loaded {} more cards ({} total)", after - before, after);
        Ok(None)
    } else {
        engine_info!("Load-more click rendered no new cards");
        Ok(Some(StopReason::NoNewCards))
    }
}
