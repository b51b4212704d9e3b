//! One crawl of one site: navigate, suppress cookies, then alternate
//! extraction passes and pagination advances until the core state machine
//! says the session is done.

use std::time::Duration;

use engine_logging::{engine_debug, engine_error, engine_info, engine_warn};
use jobscout_core::{
    update, ExtractionStats, LoadMoreCursor, PaginationCommand, PaginationMsg, PaginationState,
    PaginationType, RawJobRecord, SelectorConfig, StopReason,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cookies::CookieSuppressor;
use crate::detail::{visit_detail, DetailError, DetailOutcome};
use crate::extract::extract_card;
use crate::page::{count_matching, wait_for_cards};
use crate::{paginate, BrowserError, BrowserPage, CrawlSettings, DedupGate, SessionTerminated};

#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub state: PaginationState,
    pub stats: ExtractionStats,
    pub records: Vec<RawJobRecord>,
    /// Page-level errors, in the order they happened.
    pub errors: Vec<String>,
    pub elapsed: Duration,
}

enum CardResult {
    Accepted,
    Duplicate,
    Skipped,
}

#[derive(Debug, Default)]
struct PagePass {
    accepted: usize,
    stopped: Option<StopReason>,
    empty_loads: u32,
}

impl PagePass {
    fn into_msg(self) -> PaginationMsg {
        PaginationMsg::PageExtracted {
            accepted: self.accepted,
            stopped: self.stopped,
            empty_loads: self.empty_loads,
        }
    }
}

pub struct SessionController<'a, P: BrowserPage + 'static> {
    page: &'a P,
    config: &'a SelectorConfig,
    settings: &'a CrawlSettings,
    gate: DedupGate,
    cookies: Option<&'a dyn CookieSuppressor<P>>,
    cancel: CancellationToken,
    state: PaginationState,
    stats: ExtractionStats,
    records: Vec<RawJobRecord>,
    errors: Vec<String>,
    cards_seen: usize,
}

impl<'a, P: BrowserPage + 'static> SessionController<'a, P> {
    pub fn new(
        page: &'a P,
        config: &'a SelectorConfig,
        settings: &'a CrawlSettings,
        gate: DedupGate,
    ) -> Self {
        Self {
            page,
            config,
            settings,
            gate,
            cookies: None,
            cancel: CancellationToken::new(),
            state: PaginationState::new(config.pagination_type, config.max_pages, config.max_jobs),
            stats: ExtractionStats::default(),
            records: Vec::new(),
            errors: Vec::new(),
            cards_seen: 0,
        }
    }

    pub fn with_cookie_suppressor(mut self, cookies: &'a dyn CookieSuppressor<P>) -> Self {
        self.cookies = Some(cookies);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Drives the session to completion. Cancellation or the session budget
    /// abandon the step in flight; whatever was collected before it is kept.
    pub async fn run(mut self) -> SessionOutcome {
        let started = Instant::now();
        let deadline = self.settings.session_timeout.map(|budget| started + budget);
        let cancel = self.cancel.clone();
        let config = self.config;
        engine_info!(
            "Starting session for {} ({}) at {}",
            self.config.company_name,
            self.config.pagination_type,
            self.config.url
        );

        let mut command: Option<PaginationCommand> = None;
        loop {
            if matches!(command, Some(PaginationCommand::Finish)) {
                break;
            }
            let msg = tokio::select! {
                biased;
                _ = cancel.cancelled() => PaginationMsg::Cancelled,
                _ = budget_elapsed(deadline) => {
                    engine_warn!("Session budget for {} exhausted", config.company_name);
                    PaginationMsg::Cancelled
                }
                msg = self.execute(command) => msg,
            };
            command = Some(self.apply(msg));
        }

        self.finish(started)
    }

    fn apply(&mut self, msg: PaginationMsg) -> PaginationCommand {
        engine_debug!("Pagination message {:?} in phase {:?}", msg, self.state.phase);
        let (next, command) = update(self.state.clone(), msg);
        self.state = next;
        command
    }

    async fn execute(&mut self, command: Option<PaginationCommand>) -> PaginationMsg {
        match command {
            None => self.navigate().await,
            Some(PaginationCommand::ExtractPage) => self.extract_page().await,
            Some(PaginationCommand::AdvancePage) => {
                if let Err(terminated) = self.ensure_open().await {
                    self.record_termination(terminated);
                    return PaginationMsg::AdvanceStopped(StopReason::SessionTerminated);
                }
                match paginate::advance(self.page, &self.state, self.config, self.settings).await {
                    Ok(msg) => msg,
                    Err(terminated) => {
                        self.record_termination(terminated);
                        PaginationMsg::AdvanceStopped(StopReason::SessionTerminated)
                    }
                }
            }
            Some(PaginationCommand::Finish) => PaginationMsg::Cancelled,
        }
    }

    fn finish(self, started: Instant) -> SessionOutcome {
        let elapsed = started.elapsed();
        engine_info!(
            "Session for {} finished: {} records over {} page(s), stop reason {:?}, {:.1}s",
            self.config.company_name,
            self.records.len(),
            self.state.current_page,
            self.state.stop_reason,
            elapsed.as_secs_f64()
        );
        SessionOutcome {
            state: self.state,
            stats: self.stats,
            records: self.records,
            errors: self.errors,
            elapsed,
        }
    }

    fn record_termination(&mut self, terminated: SessionTerminated) {
        engine_error!("{}: {}", self.config.company_name, terminated);
        self.stats.browser_closed_early = true;
        self.errors.push(terminated.to_string());
    }

    async fn navigate(&mut self) -> PaginationMsg {
        let (page, config, settings) = (self.page, self.config, self.settings);
        let wait = &settings.wait;
        if let Err(err) = page.goto(&config.url, wait.navigation_timeout).await {
            self.page_error(err, "navigation");
            return PaginationMsg::NavigationFailed;
        }
        if let Err(err) =
            wait_for_cards(page, &config.card_selector, wait.card_timeout, wait.poll_interval).await
        {
            match err.escalate() {
                Err(terminated) => {
                    self.record_termination(terminated);
                    return PaginationMsg::NavigationFailed;
                }
                Ok(err) => engine_warn!("Waiting for cards failed, continuing: {}", err),
            }
        }
        if let Err(terminated) = self.suppress_cookies().await {
            self.record_termination(terminated);
            return PaginationMsg::NavigationFailed;
        }
        PaginationMsg::Navigated
    }

    fn page_error(&mut self, err: BrowserError, what: &str) {
        match err.escalate() {
            Err(terminated) => self.record_termination(terminated),
            Ok(err) => {
                engine_error!("{} {} failed: {}", self.config.company_name, what, err);
                self.errors.push(format!("{what}: {err}"));
            }
        }
    }

    async fn suppress_cookies(&self) -> Result<(), SessionTerminated> {
        let Some(cookies) = self.cookies.filter(|_| self.config.cookie_handling) else {
            return Ok(());
        };
        match cookies.suppress(self.page, self.settings.cookie_strategy).await {
            Ok(_) => Ok(()),
            Err(err) => {
                let err = err.escalate()?;
                engine_warn!("Cookie suppression failed: {}", err);
                Ok(())
            }
        }
    }

    async fn ensure_open(&self) -> Result<(), SessionTerminated> {
        if self.page.is_closed().await {
            return Err(SessionTerminated("page was closed".to_string()));
        }
        Ok(())
    }

    /// Runs before every card: a closed page ends the pass, and cookie
    /// banners are re-checked every `cookie_recheck_every` cards.
    async fn before_card(&mut self) -> Result<(), SessionTerminated> {
        self.ensure_open().await?;
        let every = self.settings.cookie_recheck_every;
        let due = every > 0 && self.cards_seen > 0 && self.cards_seen % every == 0;
        self.cards_seen += 1;
        if due {
            self.suppress_cookies().await
        } else {
            Ok(())
        }
    }

    async fn extract_page(&mut self) -> PaginationMsg {
        engine_info!(
            "Extracting page {} of {}",
            self.state.current_page,
            self.config.company_name
        );
        let pass = match self.config.pagination_type {
            PaginationType::LoadMoreProgressive => self.extract_progressively().await,
            _ => self.extract_rendered().await,
        };
        engine_info!(
            "Page {}: {} new record(s)",
            self.state.current_page,
            pass.accepted
        );
        pass.into_msg()
    }

    fn jobs_left(&self, pass: &PagePass) -> bool {
        self.state.remaining_jobs() > pass.accepted
    }

    async fn extract_rendered(&mut self) -> PagePass {
        let mut pass = PagePass::default();
        let cards = match self.page.query_all(&self.config.card_selector).await {
            Ok(cards) => cards,
            Err(err) => {
                let terminated = err.is_session_terminated();
                self.page_error(err, "finding cards");
                if terminated {
                    pass.stopped = Some(StopReason::SessionTerminated);
                }
                return pass;
            }
        };
        self.stats.cards_found += cards.len();
        engine_debug!("Found {} cards", cards.len());

        let detail = self.config.requires_detail_navigation();
        for (index, card) in cards.iter().enumerate() {
            if !self.jobs_left(&pass) {
                engine_info!("Reached the limit of {} jobs", self.config.max_jobs);
                break;
            }
            let handled = match self.before_card().await {
                Err(terminated) => Err(DetailError::Terminated(terminated)),
                Ok(()) if detail => self.process_detail_card(index).await,
                Ok(()) => self.process_listing_card(card).await,
            };
            if !self.tally(handled, &mut pass) {
                break;
            }
        }
        pass
    }

    /// `load_more_progressive`: walks rendered cards in batches and clicks
    /// load-more whenever every rendered card has been visited.
    async fn extract_progressively(&mut self) -> PagePass {
        let mut pass = PagePass::default();
        let mut cursor = LoadMoreCursor::new(self.settings.limits);
        let detail = self.config.requires_detail_navigation();

        loop {
            let rendered = match count_matching(self.page, &self.config.card_selector).await {
                Ok(count) => count,
                Err(err) => {
                    let terminated = err.is_session_terminated();
                    self.page_error(err, "counting cards");
                    if terminated {
                        pass.stopped = Some(StopReason::SessionTerminated);
                    }
                    return pass;
                }
            };

            let Some(batch) = cursor.next_batch(rendered) else {
                let loaded =
                    paginate::load_more(self.page, &mut cursor, self.config, self.settings).await;
                pass.empty_loads = cursor.empty_loads();
                match loaded {
                    Ok(None) => continue,
                    Ok(Some(reason)) => pass.stopped = Some(reason),
                    Err(terminated) => {
                        self.record_termination(terminated);
                        pass.stopped = Some(StopReason::SessionTerminated);
                    }
                }
                return pass;
            };

            engine_debug!("Processing cards {}..{} of {}", batch.start + 1, batch.end, rendered);
            self.stats.cards_found += batch.len();
            for index in batch {
                if !self.jobs_left(&pass) {
                    return pass;
                }
                let handled = match self.before_card().await {
                    Err(terminated) => Err(DetailError::Terminated(terminated)),
                    Ok(()) if detail => self.process_detail_card(index).await,
                    Ok(()) => match self.resolve_card(index).await {
                        Ok(Some(card)) => self.process_listing_card(&card).await,
                        Ok(None) => Ok(CardResult::Skipped),
                        Err(terminated) => Err(DetailError::Terminated(terminated)),
                    },
                };
                cursor.mark_visited();
                if !self.tally(handled, &mut pass) {
                    return pass;
                }
            }
        }
    }

    /// Folds one card's result into the pass. Returns false when the pass
    /// must stop.
    fn tally(&mut self, handled: Result<CardResult, DetailError>, pass: &mut PagePass) -> bool {
        match handled {
            Ok(CardResult::Accepted) => {
                pass.accepted += 1;
                true
            }
            Ok(CardResult::Duplicate | CardResult::Skipped) => true,
            Err(DetailError::Terminated(terminated)) => {
                self.record_termination(terminated);
                pass.stopped = Some(StopReason::SessionTerminated);
                false
            }
            Err(err @ DetailError::RestoreFailed { .. }) => {
                engine_error!("{}: {}", self.config.company_name, err);
                self.errors.push(err.to_string());
                pass.stopped = Some(StopReason::NavigationFailed);
                false
            }
        }
    }

    async fn resolve_card(&self, index: usize) -> Result<Option<P::Element>, SessionTerminated> {
        match self.page.query_all(&self.config.card_selector).await {
            Ok(cards) => Ok(cards.into_iter().nth(index)),
            Err(err) => {
                let err = err.escalate()?;
                engine_debug!("Could not resolve card {}: {}", index + 1, err);
                Ok(None)
            }
        }
    }

    async fn process_listing_card(&mut self, card: &P::Element) -> Result<CardResult, DetailError> {
        let record = extract_card(self.page, card, self.config, self.state.current_page).await?;
        Ok(self.accept(record))
    }

    async fn process_detail_card(&mut self, index: usize) -> Result<CardResult, DetailError> {
        let Some(card) = self.resolve_card(index).await? else {
            self.stats.skipped_extraction_errors += 1;
            return Ok(CardResult::Skipped);
        };
        let record = extract_card(self.page, &card, self.config, self.state.current_page).await?;
        if self.gate.is_duplicate(&record.apply_link) {
            engine_debug!("Skipping duplicate before navigation: {}", record.apply_link);
            self.stats.skipped_duplicates += 1;
            return Ok(CardResult::Duplicate);
        }

        match visit_detail(self.page, index, record, self.config, self.settings).await? {
            DetailOutcome::Extracted {
                record,
                container_found,
            } => {
                if !container_found {
                    self.stats.detail_errors += 1;
                }
                Ok(self.accept(record))
            }
            DetailOutcome::NoClickTarget => {
                self.stats.skipped_extraction_errors += 1;
                Ok(CardResult::Skipped)
            }
        }
    }

    fn accept(&mut self, record: RawJobRecord) -> CardResult {
        if self.gate.is_duplicate(&record.apply_link) {
            engine_debug!("Skipping duplicate: {}", record.apply_link);
            self.stats.skipped_duplicates += 1;
            return CardResult::Duplicate;
        }
        self.gate.remember(&record.apply_link);
        let record = record.finalize(chrono::Utc::now().to_rfc3339());
        engine_debug!("Accepted '{}' ({})", record.title, record.apply_link);
        self.records.push(record);
        self.stats.successful_extractions += 1;
        CardResult::Accepted
    }
}

async fn budget_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
