use chrono::{DateTime, Utc};
use jobscout_core::{ExtractionStats, PaginationState, StopReason};
use serde::Serialize;
use serde_json::Value;

use crate::session::SessionOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Success,
    PartialSuccess,
    Failed,
}

impl SessionStatus {
    /// A session fails when it produced nothing and stopped on a failure; it
    /// is partial when it kept records but hit an error or a failure stop.
    pub fn classify(stop_reason: Option<StopReason>, errors: &[String], records: usize) -> Self {
        let failed_stop = stop_reason.is_some_and(StopReason::is_failure);
        if records == 0 && (failed_stop || !errors.is_empty()) {
            Self::Failed
        } else if failed_stop || !errors.is_empty() {
            Self::PartialSuccess
        } else {
            Self::Success
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionTiming {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    pub company: String,
    pub url: String,
    pub status: SessionStatus,
    pub pages_scraped: u32,
    pub stop_reason: Option<StopReason>,
    pub errors: Vec<String>,
    pub timing: SessionTiming,
    pub stats: ExtractionStats,
    /// Jobs after enrichment and normalisation.
    pub jobs: Vec<Value>,
}

impl SessionReport {
    pub fn new(
        company: impl Into<String>,
        url: impl Into<String>,
        outcome: &SessionOutcome,
        jobs: Vec<Value>,
        stats: ExtractionStats,
        started_at: DateTime<Utc>,
    ) -> Self {
        let finished_at = Utc::now();
        let status = SessionStatus::classify(outcome.state.stop_reason, &outcome.errors, jobs.len());
        Self {
            company: company.into(),
            url: url.into(),
            status,
            pages_scraped: pages_scraped(&outcome.state),
            stop_reason: outcome.state.stop_reason,
            errors: outcome.errors.clone(),
            timing: SessionTiming {
                started_at,
                finished_at,
                duration_secs: outcome.elapsed.as_secs_f64(),
            },
            stats,
            jobs,
        }
    }

    /// Report for a site that never got a session, e.g. an invalid config.
    pub fn failed(company: impl Into<String>, url: impl Into<String>, error: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            company: company.into(),
            url: url.into(),
            status: SessionStatus::Failed,
            pages_scraped: 0,
            stop_reason: None,
            errors: vec![error.into()],
            timing: SessionTiming {
                started_at: now,
                finished_at: now,
                duration_secs: 0.0,
            },
            stats: ExtractionStats::default(),
            jobs: Vec::new(),
        }
    }
}

fn pages_scraped(state: &PaginationState) -> u32 {
    if state.stop_reason == Some(StopReason::NavigationFailed) && state.total_collected == 0 {
        0
    } else {
        state.current_page
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub sites: usize,
    pub successful_sites: usize,
    pub partial_sites: usize,
    pub failed_sites: usize,
    pub total_jobs: usize,
    pub stats: ExtractionStats,
    pub success_rate: f64,
    pub duplicate_rate: f64,
}

impl RunSummary {
    pub fn from_reports(reports: &[SessionReport]) -> Self {
        let mut stats = ExtractionStats::default();
        let count = |status: SessionStatus| reports.iter().filter(|r| r.status == status).count();
        for report in reports {
            stats += report.stats;
        }
        Self {
            sites: reports.len(),
            successful_sites: count(SessionStatus::Success),
            partial_sites: count(SessionStatus::PartialSuccess),
            failed_sites: count(SessionStatus::Failed),
            total_jobs: reports.iter().map(|r| r.jobs.len()).sum(),
            stats,
            success_rate: stats.success_rate(),
            duplicate_rate: stats.duplicate_rate(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResults {
    pub generated_at: DateTime<Utc>,
    pub summary: RunSummary,
    pub sites: Vec<SessionReport>,
}

impl RunResults {
    pub fn new(sites: Vec<SessionReport>) -> Self {
        Self {
            generated_at: Utc::now(),
            summary: RunSummary::from_reports(&sites),
            sites,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_follows_stop_reason_errors_and_records() {
        let none: Vec<String> = Vec::new();
        let some = vec!["navigation: timeout".to_string()];
        assert_eq!(
            SessionStatus::classify(Some(StopReason::ControlDisabled), &none, 3),
            SessionStatus::Success
        );
        assert_eq!(
            SessionStatus::classify(Some(StopReason::SessionTerminated), &some, 3),
            SessionStatus::PartialSuccess
        );
        assert_eq!(
            SessionStatus::classify(Some(StopReason::NavigationFailed), &some, 0),
            SessionStatus::Failed
        );
        assert_eq!(
            SessionStatus::classify(Some(StopReason::SinglePage), &none, 0),
            SessionStatus::Success
        );
    }

    #[test]
    fn summary_merges_stats_and_counts_statuses() {
        let mut a = SessionReport::failed("A", "https://a.example", "bad config");
        a.stats.skipped_duplicates = 1;
        let mut b = SessionReport::failed("B", "https://b.example", "boom");
        b.status = SessionStatus::Success;
        b.stats.successful_extractions = 3;
        b.stats.browser_closed_early = true;
        b.jobs = vec![Value::Null; 3];

        let summary = RunSummary::from_reports(&[a, b]);
        assert_eq!(summary.sites, 2);
        assert_eq!(summary.failed_sites, 1);
        assert_eq!(summary.successful_sites, 1);
        assert_eq!(summary.total_jobs, 3);
        assert_eq!(summary.stats.cards_processed(), 4);
        assert!(summary.stats.browser_closed_early);
        assert_eq!(summary.success_rate, 75.0);
    }
}
