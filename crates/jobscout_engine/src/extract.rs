//! Card field extraction. A missing or unreadable field becomes the `"N/A"`
//! sentinel; only a terminated browser session escapes as an error.

use engine_logging::engine_debug;
use jobscout_core::{parse_metadata, RawJobRecord, SelectorConfig, NOT_AVAILABLE};
use url::Url;

use crate::page::query_first_within;
use crate::{BrowserError, BrowserPage, SessionTerminated};

fn absorb(err: BrowserError, what: &str) -> Result<String, SessionTerminated> {
    let err = err.escalate()?;
    engine_debug!("Could not read {}: {}", what, err);
    Ok(NOT_AVAILABLE.to_string())
}

fn or_sentinel(text: String) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Trimmed text of the first `selector` match inside `scope`.
pub async fn extract_field<P: BrowserPage>(
    page: &P,
    scope: &P::Element,
    selector: &str,
) -> Result<String, SessionTerminated> {
    if selector.trim().is_empty() {
        return Ok(NOT_AVAILABLE.to_string());
    }
    let element = match query_first_within(page, scope, selector).await {
        Ok(Some(element)) => element,
        Ok(None) => return Ok(NOT_AVAILABLE.to_string()),
        Err(err) => return absorb(err, selector),
    };
    match page.inner_text(&element).await {
        Ok(text) => Ok(or_sentinel(text)),
        Err(err) => absorb(err, selector),
    }
}

/// Tries each selector in order and keeps the first non-sentinel value.
pub async fn extract_first_of<P: BrowserPage>(
    page: &P,
    scope: &P::Element,
    selectors: &[String],
) -> Result<String, SessionTerminated> {
    for selector in selectors {
        let value = extract_field(page, scope, selector).await?;
        if value != NOT_AVAILABLE {
            return Ok(value);
        }
    }
    Ok(NOT_AVAILABLE.to_string())
}

/// `href` of the link inside the card (or of the card itself when no link
/// selector is configured), resolved against the site origin.
pub async fn extract_href<P: BrowserPage>(
    page: &P,
    card: &P::Element,
    link_selector: &str,
    site_url: &str,
) -> Result<String, SessionTerminated> {
    let href = if link_selector.trim().is_empty() {
        page.attribute(card, "href").await
    } else {
        match query_first_within(page, card, link_selector).await {
            Ok(Some(link)) => page.attribute(&link, "href").await,
            Ok(None) => Ok(None),
            Err(err) => Err(err),
        }
    };
    match href {
        Ok(Some(href)) => Ok(resolve_href(site_url, &href)),
        Ok(None) => Ok(NOT_AVAILABLE.to_string()),
        Err(err) => absorb(err, "href"),
    }
}

/// Absolute links pass through; root-relative and relative links are joined
/// to the site's origin or url.
pub fn resolve_href(site_url: &str, href: &str) -> String {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return NOT_AVAILABLE.to_string();
    }
    if Url::parse(href).is_ok() {
        return href.to_string();
    }
    match Url::parse(site_url).and_then(|base| base.join(href)) {
        Ok(joined) => joined.to_string(),
        Err(_) => href.to_string(),
    }
}

/// Builds a record from one listing card.
pub async fn extract_card<P: BrowserPage>(
    page: &P,
    card: &P::Element,
    config: &SelectorConfig,
    page_number: u32,
) -> Result<RawJobRecord, SessionTerminated> {
    let mut record = RawJobRecord::new(&config.company_name, &config.url, page_number);
    record.title = extract_field(page, card, &config.title_selector).await?;

    match config.metadata_selector.as_deref() {
        Some(metadata_selector) if config.use_metadata_parsing => {
            let raw = extract_field(page, card, metadata_selector).await?;
            if raw != NOT_AVAILABLE {
                parse_metadata(&raw).apply_to(&mut record);
            }
            record.metadata_raw = raw;
        }
        _ => {
            record.location = extract_field(page, card, &config.location_selector).await?;
            record.posted_date = extract_field(page, card, &config.posted_selector).await?;
        }
    }

    record.description = extract_field(page, card, &config.description_selector).await?;
    record.apply_link = extract_href(page, card, &config.link_selector, &config.url).await?;
    Ok(record)
}
