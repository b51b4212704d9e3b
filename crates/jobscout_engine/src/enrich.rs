//! Apply-page enrichment: when a record has a link but no detail text, fetch
//! the linked page over plain HTTP and keep its main text.

use std::sync::Arc;

use engine_logging::{engine_debug, engine_info};
use jobscout_core::{is_available, RawJobRecord};
use scraper::{Html, Selector};

use crate::decode::decode_html;
use crate::fetch::Fetcher;
use crate::static_page::rendered_text;
use crate::truncate::truncate_chars;
use crate::FetchError;

/// Containers tried in order; the first with text wins.
const MAIN_CONTENT_SELECTORS: &[&str] = &["article", "main", "[role=main]", "body"];

pub struct ApplyPageEnricher {
    fetcher: Arc<dyn Fetcher>,
    max_chars: usize,
}

impl ApplyPageEnricher {
    pub fn new(fetcher: Arc<dyn Fetcher>, max_chars: usize) -> Self {
        Self { fetcher, max_chars }
    }

    /// Fills `detail_info` from the apply page. Returns whether the record
    /// changed; records that already carry detail text are left alone.
    pub async fn enrich(&self, record: &mut RawJobRecord) -> Result<bool, FetchError> {
        if is_available(&record.detail_info) || !is_http_link(&record.apply_link) {
            return Ok(false);
        }
        let output = self.fetcher.fetch(&record.apply_link).await?;
        let decoded = decode_html(&output.bytes, output.metadata.content_type.as_deref())?;
        match main_text(&decoded.html) {
            Some(text) => {
                record.detail_info = truncate_chars(&text, self.max_chars);
                engine_info!(
                    "Enriched '{}' from {} ({} chars)",
                    record.title,
                    output.metadata.final_url,
                    record.detail_info.chars().count()
                );
                Ok(true)
            }
            None => {
                engine_debug!("No readable text on {}", output.metadata.final_url);
                Ok(false)
            }
        }
    }
}

fn is_http_link(link: &str) -> bool {
    link.starts_with("http://") || link.starts_with("https://")
}

pub fn main_text(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    MAIN_CONTENT_SELECTORS.iter().find_map(|raw| {
        let selector = Selector::parse(raw).ok()?;
        let text = rendered_text(document.select(&selector).next()?);
        is_available(&text).then_some(text)
    })
}
