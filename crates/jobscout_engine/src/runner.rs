//! Runs every configured site, each in its own session on its own page,
//! with at most `concurrency` sessions in flight.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use engine_logging::{engine_error, engine_info, engine_warn};
use jobscout_core::{ConfigError, RawJobRecord, SelectorConfig};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::cookies::{CookieSuppressor, RulesetCookieSuppressor};
use crate::enrich::ApplyPageEnricher;
use crate::fetch::Fetcher;
use crate::normalize::{normalize_or_raw, NoopNormalizer, Normalizer};
use crate::report::{RunResults, SessionReport};
use crate::session::{SessionController, SessionOutcome};
use crate::static_page::StaticPage;
use crate::{BrowserError, BrowserPage, CrawlSettings, DedupGate, DedupStore};

/// Hands out one fresh page per session.
#[async_trait]
pub trait PageFactory: Send + Sync {
    type Page: BrowserPage + 'static;

    async fn open_page(&self) -> Result<Self::Page, BrowserError>;

    async fn release_page(&self, _page: Self::Page) {}
}

pub struct StaticPageFactory {
    fetcher: Arc<dyn Fetcher>,
}

impl StaticPageFactory {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl PageFactory for StaticPageFactory {
    type Page = StaticPage;

    async fn open_page(&self) -> Result<StaticPage, BrowserError> {
        Ok(StaticPage::new(Arc::clone(&self.fetcher)))
    }
}

#[cfg(feature = "chromium")]
#[async_trait]
impl PageFactory for crate::chromium::ChromiumBrowser {
    type Page = crate::chromium::ChromiumPage;

    async fn open_page(&self) -> Result<Self::Page, BrowserError> {
        self.new_page().await
    }

    async fn release_page(&self, page: Self::Page) {
        page.close().await;
    }
}

pub struct CrawlRunner<F: PageFactory> {
    factory: Arc<F>,
    settings: Arc<CrawlSettings>,
    gate: DedupGate,
    cookies: Arc<dyn CookieSuppressor<F::Page>>,
    normalizer: Arc<dyn Normalizer>,
    enricher: Option<Arc<ApplyPageEnricher>>,
    cancel: CancellationToken,
}

impl<F: PageFactory + 'static> CrawlRunner<F> {
    pub fn new(factory: Arc<F>, settings: CrawlSettings, store: Arc<dyn DedupStore>) -> Self {
        let cookies = Arc::new(RulesetCookieSuppressor::new(settings.wait.cookie_settle));
        Self {
            factory,
            settings: Arc::new(settings),
            gate: DedupGate::new(store),
            cookies,
            normalizer: Arc::new(NoopNormalizer),
            enricher: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cookie_suppressor(mut self, cookies: Arc<dyn CookieSuppressor<F::Page>>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Arc<dyn Normalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_enricher(mut self, enricher: ApplyPageEnricher) -> Self {
        self.enricher = Some(Arc::new(enricher));
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Crawls every site. Reports come back in input order; entries that
    /// failed validation become failed reports without opening a page.
    pub async fn run(&self, sites: Vec<Result<SelectorConfig, ConfigError>>) -> RunResults {
        let permits = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let mut reports: Vec<Option<SessionReport>> = Vec::new();
        let mut identities: Vec<(String, String)> = Vec::new();

        for (index, site) in sites.into_iter().enumerate() {
            reports.push(None);
            identities.push(match &site {
                Ok(config) => (config.company_name.clone(), config.url.clone()),
                Err(_) => (String::new(), String::new()),
            });
            let config = match site {
                Ok(config) => config,
                Err(err) => {
                    engine_error!("Skipping company entry {}: {}", index + 1, err);
                    let company = err
                        .company()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("entry {}", index + 1));
                    reports[index] = Some(SessionReport::failed(company, "", err.to_string()));
                    continue;
                }
            };
            let job = SiteJob {
                factory: Arc::clone(&self.factory),
                settings: Arc::clone(&self.settings),
                gate: self.gate.clone(),
                cookies: Arc::clone(&self.cookies),
                normalizer: Arc::clone(&self.normalizer),
                enricher: self.enricher.clone(),
                cancel: self.cancel.child_token(),
            };
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (index, SessionReport::failed(&config.company_name, &config.url, "runner shut down"));
                };
                (index, job.run(config).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, report)) => reports[index] = Some(report),
                Err(err) => engine_error!("Session task failed: {}", err),
            }
        }

        let sites: Vec<SessionReport> = reports
            .into_iter()
            .zip(identities)
            .map(|(report, (company, url))| {
                report.unwrap_or_else(|| {
                    SessionReport::failed(company, url, "session task ended without a report")
                })
            })
            .collect();
        let results = RunResults::new(sites);
        engine_info!(
            "Run finished: {} sites, {} jobs, {:.1}% success",
            results.summary.sites,
            results.summary.total_jobs,
            results.summary.success_rate
        );
        results
    }
}

struct SiteJob<F: PageFactory> {
    factory: Arc<F>,
    settings: Arc<CrawlSettings>,
    gate: DedupGate,
    cookies: Arc<dyn CookieSuppressor<F::Page>>,
    normalizer: Arc<dyn Normalizer>,
    enricher: Option<Arc<ApplyPageEnricher>>,
    cancel: CancellationToken,
}

impl<F: PageFactory + 'static> SiteJob<F> {
    async fn run(self, config: SelectorConfig) -> SessionReport {
        let started_at = Utc::now();
        let page = match self.factory.open_page().await {
            Ok(page) => page,
            Err(err) => {
                engine_error!("{}: could not open a page: {}", config.company_name, err);
                return SessionReport::failed(&config.company_name, &config.url, err.to_string());
            }
        };

        let outcome = SessionController::new(&page, &config, &self.settings, self.gate.clone())
            .with_cookie_suppressor(self.cookies.as_ref())
            .with_cancellation(self.cancel.clone())
            .run()
            .await;
        self.factory.release_page(page).await;

        self.finish(&config, outcome, started_at).await
    }

    async fn finish(
        &self,
        config: &SelectorConfig,
        outcome: SessionOutcome,
        started_at: chrono::DateTime<Utc>,
    ) -> SessionReport {
        let mut stats = outcome.stats;
        let mut jobs = Vec::with_capacity(outcome.records.len());
        for record in &outcome.records {
            let record = self.enrich(record.clone(), &mut stats).await;
            jobs.push(normalize_or_raw(self.normalizer.as_ref(), &record, &mut stats).await);
        }
        SessionReport::new(&config.company_name, &config.url, &outcome, jobs, stats, started_at)
    }

    async fn enrich(
        &self,
        mut record: RawJobRecord,
        stats: &mut jobscout_core::ExtractionStats,
    ) -> RawJobRecord {
        let Some(enricher) = self.enricher.as_ref().filter(|_| self.settings.fetch_apply_pages) else {
            return record;
        };
        if self.cancel.is_cancelled() {
            return record;
        }
        if let Err(err) = enricher.enrich(&mut record).await {
            engine_warn!("Apply page for '{}' failed: {}", record.title, err);
            stats.detail_errors += 1;
        }
        record
    }
}
