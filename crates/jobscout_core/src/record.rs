use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Sentinel for any field that could not be extracted. Never null or omitted.
pub const NOT_AVAILABLE: &str = "N/A";

/// One job posting as scraped, before any normalisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawJobRecord {
    pub title: String,
    pub company: String,
    pub location: String,
    pub posted_date: String,
    pub apply_link: String,
    pub description: String,
    pub detail_info: String,
    pub experience: String,
    pub skills: String,
    pub metadata_raw: String,
    pub source_url: String,
    pub scraped_at: String,
    pub page_number: u32,

    pub salary: String,
    pub employment_type: String,
    pub experience_level: String,
    pub department: String,
    pub requirements: String,
    pub benefits: String,
    pub deadline: String,
    pub job_id: String,
    pub tags: String,
    pub remote_work: String,

    /// Detail fields configured by a site that have no dedicated slot.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, String>,
}

impl RawJobRecord {
    pub fn new(company: impl Into<String>, source_url: impl Into<String>, page_number: u32) -> Self {
        let na = || NOT_AVAILABLE.to_string();
        Self {
            title: na(),
            company: company.into(),
            location: na(),
            posted_date: na(),
            apply_link: na(),
            description: na(),
            detail_info: na(),
            experience: na(),
            skills: na(),
            metadata_raw: na(),
            source_url: source_url.into(),
            scraped_at: na(),
            page_number,
            salary: na(),
            employment_type: na(),
            experience_level: na(),
            department: na(),
            requirements: na(),
            benefits: na(),
            deadline: na(),
            job_id: na(),
            tags: na(),
            remote_work: na(),
            extra: BTreeMap::new(),
        }
    }

    pub fn has_apply_link(&self) -> bool {
        is_available(&self.apply_link)
    }

    /// Stores a detail-view value under its field name. Known names map to
    /// their dedicated slot; anything else lands in `extra`. Sentinel or blank
    /// values never overwrite what is already there.
    pub fn set_field(&mut self, name: &str, value: String) {
        if !is_available(&value) {
            return;
        }
        let slot = match name {
            "title" => &mut self.title,
            "location" => &mut self.location,
            "posted_date" | "posted" => &mut self.posted_date,
            "description" => &mut self.description,
            "experience" => &mut self.experience,
            "skills" => &mut self.skills,
            "salary" => &mut self.salary,
            "employment_type" => &mut self.employment_type,
            "experience_level" => &mut self.experience_level,
            "department" => &mut self.department,
            "requirements" | "qualifications" => &mut self.requirements,
            "benefits" => &mut self.benefits,
            "deadline" => &mut self.deadline,
            "job_id" => &mut self.job_id,
            "tags" => &mut self.tags,
            "remote_work" => &mut self.remote_work,
            other => {
                self.extra.insert(other.to_string(), value);
                return;
            }
        };
        *slot = value;
    }

    /// Collapses whitespace runs in the long text fields and stamps the
    /// scrape time. Called once, right before the record leaves the session.
    pub fn finalize(mut self, scraped_at: impl Into<String>) -> Self {
        self.description = collapse_whitespace(&self.description);
        self.detail_info = collapse_whitespace(&self.detail_info);
        self.scraped_at = scraped_at.into();
        self
    }
}

pub fn is_available(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty() && trimmed != NOT_AVAILABLE
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
