use std::fs;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use engine_logging::{engine_error, engine_info, engine_warn, LogDestination};
use jobscout_core::{load_company_configs, ConfigError, SelectorConfig};
use jobscout_engine::{
    results_filename, ApplyPageEnricher, AtomicFileWriter, CrawlRunner, CrawlSettings,
    FetchSettings, Fetcher, GeminiNormalizer, NoopNormalizer, Normalizer, PageFactory,
    ReqwestFetcher, RunResults, StaticPageFactory,
};

use super::cli::{Args, Backend};
use super::persistence::RonSeenStore;

type SiteEntries = Vec<Result<SelectorConfig, ConfigError>>;

pub fn run(args: Args) -> anyhow::Result<()> {
    let destination = LogDestination::from_name(&args.log)
        .ok_or_else(|| anyhow!("unknown log destination `{}`", args.log))?;
    if !engine_logging::initialize(&destination, args.log_level()) {
        eprintln!("jobscout: logging could not be initialised, continuing without it");
    }

    let text = fs::read_to_string(&args.config)
        .with_context(|| format!("reading companies file {}", args.config.display()))?;
    let sites = load_company_configs(&text, &args.config_defaults())
        .with_context(|| format!("parsing companies file {}", args.config.display()))?;
    if sites.is_empty() {
        bail!("no companies in {}", args.config.display());
    }
    engine_info!("Loaded {} companies from {:?}", sites.len(), args.config);

    let state_path = args.state_path();
    let store = Arc::new(if args.fresh {
        RonSeenStore::empty(state_path)
    } else {
        RonSeenStore::load(state_path)
    });
    let known = store.len();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    let results = runtime.block_on(crawl(&args, args.crawl_settings(), sites, store.clone()))?;

    let label = args
        .config
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default();
    let filename = results_filename(label, &args.config.display().to_string(), results.generated_at);
    let written = AtomicFileWriter::new(args.output_dir.clone())
        .write_json(&filename, &results)
        .context("writing results")?;

    match store.save() {
        Ok(path) => engine_info!(
            "Seen links: {} ({} new) saved to {:?}",
            store.len(),
            store.len().saturating_sub(known),
            path
        ),
        Err(err) => engine_error!("Failed to save seen links: {}", err),
    }

    let summary = &results.summary;
    engine_info!(
        "Run finished: {} sites ({} ok, {} partial, {} failed), {} jobs, {:.1}% success, {:.1}% duplicates",
        summary.sites,
        summary.successful_sites,
        summary.partial_sites,
        summary.failed_sites,
        summary.total_jobs,
        summary.success_rate,
        summary.duplicate_rate
    );
    println!("{}", written.display());
    Ok(())
}

async fn crawl(
    args: &Args,
    settings: CrawlSettings,
    sites: SiteEntries,
    store: Arc<RonSeenStore>,
) -> anyhow::Result<RunResults> {
    let normalizer: Arc<dyn Normalizer> = match args.gemini_key.as_deref() {
        Some(key) if !key.trim().is_empty() => {
            engine_info!("Normalising records with Gemini");
            Arc::new(GeminiNormalizer::new(key.trim())?)
        }
        _ => Arc::new(NoopNormalizer),
    };
    let fetcher: Arc<dyn Fetcher> = Arc::new(ReqwestFetcher::new(FetchSettings {
        user_agent: settings.user_agent.clone(),
        ..FetchSettings::default()
    }));
    let enricher = ApplyPageEnricher::new(fetcher.clone(), settings.description_max_chars);

    match args.backend {
        Backend::Static => {
            let factory = Arc::new(StaticPageFactory::new(fetcher));
            let runner = CrawlRunner::new(factory, settings, store)
                .with_normalizer(normalizer)
                .with_enricher(enricher);
            Ok(run_until_interrupted(&runner, sites).await)
        }
        Backend::Chromium => {
            crawl_chromium(args, settings, sites, store, normalizer, enricher).await
        }
    }
}

#[cfg(feature = "chromium")]
async fn crawl_chromium(
    args: &Args,
    settings: CrawlSettings,
    sites: SiteEntries,
    store: Arc<RonSeenStore>,
    normalizer: Arc<dyn Normalizer>,
    enricher: ApplyPageEnricher,
) -> anyhow::Result<RunResults> {
    use jobscout_engine::ChromiumBrowser;

    let browser = Arc::new(
        ChromiumBrowser::launch(!args.headful, &settings.user_agent)
            .await
            .context("launching Chromium")?,
    );
    let runner = CrawlRunner::new(browser.clone(), settings, store)
        .with_normalizer(normalizer)
        .with_enricher(enricher);
    let results = run_until_interrupted(&runner, sites).await;
    drop(runner);

    match Arc::try_unwrap(browser) {
        Ok(browser) => browser.shutdown().await,
        Err(_) => engine_warn!("Browser still shared at shutdown, leaving it to drop"),
    }
    Ok(results)
}

#[cfg(not(feature = "chromium"))]
async fn crawl_chromium(
    _args: &Args,
    _settings: CrawlSettings,
    _sites: SiteEntries,
    _store: Arc<RonSeenStore>,
    _normalizer: Arc<dyn Normalizer>,
    _enricher: ApplyPageEnricher,
) -> anyhow::Result<RunResults> {
    bail!("built without the `chromium` feature; use --backend static")
}

/// Runs every site, cancelling the run on Ctrl-C. Sessions cut short still
/// report what they collected.
async fn run_until_interrupted<F: PageFactory + 'static>(
    runner: &CrawlRunner<F>,
    sites: SiteEntries,
) -> RunResults {
    let token = runner.cancellation_token();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            engine_warn!("Interrupted, finishing open sessions");
            token.cancel();
        }
    });
    let results = runner.run(sites).await;
    watcher.abort();
    results
}
