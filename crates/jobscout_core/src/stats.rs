use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

/// Per-session extraction counters. Counters only grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub cards_found: usize,
    pub successful_extractions: usize,
    pub skipped_duplicates: usize,
    pub skipped_extraction_errors: usize,
    pub detail_errors: usize,
    pub normalization_errors: usize,
    pub browser_closed_early: bool,
}

impl ExtractionStats {
    /// Cards that were looked at in any way.
    pub fn cards_processed(&self) -> usize {
        self.successful_extractions + self.skipped_duplicates + self.skipped_extraction_errors
    }

    /// Share of processed cards that became records, in percent.
    pub fn success_rate(&self) -> f64 {
        percent(self.successful_extractions, self.cards_processed())
    }

    pub fn duplicate_rate(&self) -> f64 {
        percent(self.skipped_duplicates, self.cards_processed())
    }
}

impl AddAssign for ExtractionStats {
    fn add_assign(&mut self, other: Self) {
        self.cards_found += other.cards_found;
        self.successful_extractions += other.successful_extractions;
        self.skipped_duplicates += other.skipped_duplicates;
        self.skipped_extraction_errors += other.skipped_extraction_errors;
        self.detail_errors += other.detail_errors;
        self.normalization_errors += other.normalization_errors;
        self.browser_closed_early |= other.browser_closed_early;
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}
