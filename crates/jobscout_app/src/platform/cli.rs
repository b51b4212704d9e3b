use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use jobscout_core::{ConfigDefaults, DEFAULT_MAX_JOBS, DEFAULT_MAX_PAGES, DEFAULT_SCROLL_PAUSE_MS};
use jobscout_engine::{CookieStrategy, CrawlSettings};

pub const STATE_FILENAME: &str = ".jobscout_seen.ron";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Headless Chromium over the DevTools protocol.
    Chromium,
    /// Plain HTTP fetches; no scripts run.
    Static,
}

/// Crawls company careers pages and writes the extracted jobs as JSON.
#[derive(Debug, Parser)]
#[command(name = "jobscout", version, about)]
pub struct Args {
    /// Companies file (JSON array, or an object with a `companies` map)
    #[arg(short, long, default_value = "companies.json")]
    pub config: PathBuf,

    /// Directory for results files
    #[arg(short, long, default_value = "results")]
    pub output_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = Backend::Chromium)]
    pub backend: Backend,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,

    /// hide_only, click_only, hide_and_accept or hide_and_reject
    #[arg(long, default_value = "hide_and_accept")]
    pub cookie_strategy: CookieStrategy,

    /// Sites crawled at once
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pub concurrency: u16,

    /// Wall-clock budget per site, unbounded when omitted
    #[arg(long)]
    pub session_timeout_secs: Option<u64>,

    /// Default page limit for sites that set none
    #[arg(long, default_value_t = DEFAULT_MAX_PAGES)]
    pub max_pages: u32,

    /// Default job limit for sites that set none
    #[arg(long, default_value_t = DEFAULT_MAX_JOBS)]
    pub max_jobs: usize,

    /// Default pause between scrolls, in milliseconds
    #[arg(long, default_value_t = DEFAULT_SCROLL_PAUSE_MS)]
    pub scroll_pause_ms: u64,

    /// Fetch every apply link and keep its main text
    #[arg(long)]
    pub fetch_apply_pages: bool,

    /// Seen-link store; defaults to a file inside the output directory
    #[arg(long)]
    pub state_file: Option<PathBuf>,

    /// Ignore and overwrite the seen-link store
    #[arg(long)]
    pub fresh: bool,

    /// Key for the Gemini normaliser; raw records are kept without it
    #[arg(long, env = "GEMINI_KEY", hide_env_values = true)]
    pub gemini_key: Option<String>,

    /// Log destination: terminal, file or both
    #[arg(long, default_value = "both")]
    pub log: String,

    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn config_defaults(&self) -> ConfigDefaults {
        ConfigDefaults {
            max_pages: self.max_pages,
            max_jobs: self.max_jobs,
            scroll_pause_ms: self.scroll_pause_ms,
        }
    }

    pub fn crawl_settings(&self) -> CrawlSettings {
        CrawlSettings {
            cookie_strategy: self.cookie_strategy,
            session_timeout: self.session_timeout_secs.map(Duration::from_secs),
            concurrency: usize::from(self.concurrency),
            fetch_apply_pages: self.fetch_apply_pages,
            ..CrawlSettings::default()
        }
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| self.output_dir.join(STATE_FILENAME))
    }

    pub fn log_level(&self) -> log::LevelFilter {
        if self.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        }
    }
}
