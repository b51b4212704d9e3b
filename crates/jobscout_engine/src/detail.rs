//! Detail-view extraction for sites whose cards carry no usable link: click
//! into the card, read the detail container, then restore the listing.

use engine_logging::{engine_debug, engine_info, engine_warn};
use jobscout_core::{
    click_target_chain, detail_field_chains, is_available, RawJobRecord, SelectorConfig,
    DEFAULT_DETAIL_CONTAINER,
};

use crate::extract::extract_first_of;
use crate::page::{query_first_within, wait_for_selector, wait_for_text_len, wait_for_url_change};
use crate::truncate::cap_detail_field;
use crate::{BrowserError, BrowserPage, CrawlSettings, SessionTerminated};

#[derive(Debug, Clone, PartialEq)]
pub enum DetailOutcome {
    /// The detail view was visited. `container_found` is false when the
    /// detail container never appeared and only card fields are filled.
    Extracted {
        record: RawJobRecord,
        container_found: bool,
    },
    /// No click target resolved, or the card vanished before it was clicked.
    NoClickTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DetailError {
    #[error(transparent)]
    Terminated(#[from] SessionTerminated),
    /// Neither going back nor re-navigating brought the listing back.
    #[error("could not restore listing {url}: {message}")]
    RestoreFailed { url: String, message: String },
}

fn tolerate(err: BrowserError, what: &str) -> Result<(), SessionTerminated> {
    let err = err.escalate()?;
    engine_debug!("{} failed: {}", what, err);
    Ok(())
}

/// Visits the detail view of the card at `card_index` and merges what it
/// finds into `record`, which already holds the card's own fields.
///
/// Card handles are re-resolved by index because earlier visits may have
/// replaced the listing document.
pub async fn visit_detail<P: BrowserPage>(
    page: &P,
    card_index: usize,
    mut record: RawJobRecord,
    config: &SelectorConfig,
    settings: &CrawlSettings,
) -> Result<DetailOutcome, DetailError> {
    let listing_url = match page.current_url().await {
        Ok(url) => url,
        Err(err) => {
            tolerate(err, "reading listing url")?;
            config.url.clone()
        }
    };

    let card = match page.query_all(&config.card_selector).await {
        Ok(cards) => cards.into_iter().nth(card_index),
        Err(err) => {
            tolerate(err, "resolving cards")?;
            None
        }
    };
    let Some(card) = card else {
        engine_warn!("Card {} is no longer on the page", card_index + 1);
        return Ok(DetailOutcome::NoClickTarget);
    };
    if let Err(err) = page.scroll_into_view(&card).await {
        tolerate(err, "scrolling card into view")?;
    }

    if !click_into(page, &card, config).await? {
        engine_warn!("No clickable element found for card {}", card_index + 1);
        return Ok(DetailOutcome::NoClickTarget);
    }

    let wait = &settings.wait;
    let url_change =
        wait_for_url_change(page, &listing_url, wait.url_change_timeout, wait.poll_interval).await;
    let navigated = match url_change {
        Ok(Some(url)) => {
            engine_debug!("Detail view opened at {}", url);
            record.apply_link = url;
            true
        }
        Ok(None) => {
            engine_debug!("No navigation after click, waiting for content");
            tokio::time::sleep(wait.settle_delay).await;
            let current = match page.current_url().await {
                Ok(url) => url,
                Err(err) => {
                    tolerate(err, "reading detail url")?;
                    listing_url.clone()
                }
            };
            if current != listing_url {
                record.apply_link = current;
                true
            } else {
                if !record.has_apply_link() {
                    record.apply_link = current;
                }
                false
            }
        }
        Err(err) => {
            tolerate(err, "waiting for url change")?;
            false
        }
    };

    let container_found = read_detail_container(page, &mut record, config, settings).await?;

    if navigated {
        restore_listing(page, &listing_url, config, settings).await?;
    }

    engine_info!("Detail extracted for '{}'", record.title);
    Ok(DetailOutcome::Extracted {
        record,
        container_found,
    })
}

async fn click_into<P: BrowserPage>(
    page: &P,
    card: &P::Element,
    config: &SelectorConfig,
) -> Result<bool, SessionTerminated> {
    for target in click_target_chain(config) {
        let clicked = match target.selector() {
            Some(selector) => match query_first_within(page, card, selector).await {
                Ok(Some(element)) => page.click(&element).await,
                Ok(None) => continue,
                Err(err) => Err(err),
            },
            None => page.click(card).await,
        };
        match clicked {
            Ok(()) => {
                engine_debug!("Clicked card through {:?}", target);
                return Ok(true);
            }
            Err(err) => tolerate(err, "clicking card target")?,
        }
    }
    Ok(false)
}

/// Fills `record` from the detail container. Returns false when the
/// container never appeared.
async fn read_detail_container<P: BrowserPage>(
    page: &P,
    record: &mut RawJobRecord,
    config: &SelectorConfig,
    settings: &CrawlSettings,
) -> Result<bool, SessionTerminated> {
    let wait = &settings.wait;
    let selector = config
        .detail_container_selector
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(DEFAULT_DETAIL_CONTAINER);

    match wait_for_selector(page, selector, wait.detail_container_timeout, wait.poll_interval).await {
        Ok(true) => {}
        Ok(false) => {
            engine_warn!("Detail container '{}' did not appear", selector);
            return Ok(false);
        }
        Err(err) => {
            tolerate(err, "waiting for detail container")?;
            return Ok(false);
        }
    }

    match wait_for_text_len(
        page,
        selector,
        settings.detail_min_text_chars,
        wait.detail_text_timeout,
        wait.poll_interval,
    )
    .await
    {
        Ok(true) => {}
        Ok(false) => engine_warn!("Detail container may still be loading, proceeding anyway"),
        Err(err) => tolerate(err, "waiting for detail text")?,
    }

    let container = match page.query_all(selector).await {
        Ok(found) => found.into_iter().next(),
        Err(err) => {
            tolerate(err, "resolving detail container")?;
            None
        }
    };
    let Some(container) = container else {
        return Ok(false);
    };

    match page.inner_text(&container).await {
        Ok(text) if is_available(&text) => record.detail_info = text.trim().to_string(),
        Ok(_) => {}
        Err(err) => tolerate(err, "reading detail container")?,
    }

    for chain in detail_field_chains(config) {
        let value = extract_first_of(page, &container, &chain.selectors).await?;
        let value = cap_detail_field(
            &chain.field,
            value,
            settings.description_max_chars,
            settings.requirements_max_chars,
        );
        record.set_field(&chain.field, value);
    }
    Ok(true)
}

/// Brings the listing back after a detail visit: history back first, then a
/// fresh navigation to `listing_url`.
pub async fn restore_listing<P: BrowserPage>(
    page: &P,
    listing_url: &str,
    config: &SelectorConfig,
    settings: &CrawlSettings,
) -> Result<(), DetailError> {
    let wait = &settings.wait;
    match page.go_back(wait.navigation_timeout).await {
        Ok(()) => {
            tokio::time::sleep(wait.restore_delay).await;
            if cards_visible(page, config, settings).await? {
                return Ok(());
            }
            engine_warn!("Cards missing after going back, reloading {}", listing_url);
        }
        Err(err) => {
            tolerate(err, "going back")?;
            engine_warn!("Going back failed, reloading {}", listing_url);
        }
    }

    let restore_error = |message: String| DetailError::RestoreFailed {
        url: listing_url.to_string(),
        message,
    };
    if let Err(err) = page.goto(listing_url, wait.navigation_timeout).await {
        let err = err.escalate()?;
        return Err(restore_error(err.to_string()));
    }
    tokio::time::sleep(wait.settle_delay).await;
    if cards_visible(page, config, settings).await? {
        Ok(())
    } else {
        Err(restore_error(format!(
            "cards '{}' did not reappear",
            config.card_selector
        )))
    }
}

async fn cards_visible<P: BrowserPage>(
    page: &P,
    config: &SelectorConfig,
    settings: &CrawlSettings,
) -> Result<bool, SessionTerminated> {
    let wait = &settings.wait;
    match wait_for_selector(page, &config.card_selector, wait.card_timeout, wait.poll_interval).await {
        Ok(found) => Ok(found),
        Err(err) => {
            tolerate(err, "waiting for cards")?;
            Ok(false)
        }
    }
}
