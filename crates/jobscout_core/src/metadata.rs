//! Heuristic parser for the free-text metadata block some sites render
//! instead of separate location and date elements.
//!
//! Rules are tried in a fixed order and the first one that applies wins:
//!
//! 1. `Posted <Mon> <D>, <YYYY><location>` with no separator between date and
//!    location.
//! 2. `Experience:` / `Required Skill:` markers, which produce the detailed
//!    form with experience and skills.
//! 3. Independent location and date searches over ordered pattern lists.
//!
//! Every miss falls back to the `"N/A"` sentinel; parsing never fails.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::record::{RawJobRecord, NOT_AVAILABLE};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "form", rename_all = "snake_case")]
pub enum ParsedMetadata {
    LocationDate {
        location: String,
        posted_date: String,
    },
    Detailed {
        location: String,
        posted_date: String,
        experience: String,
        skills: String,
    },
}

impl ParsedMetadata {
    pub fn location(&self) -> &str {
        match self {
            Self::LocationDate { location, .. } | Self::Detailed { location, .. } => location,
        }
    }

    pub fn posted_date(&self) -> &str {
        match self {
            Self::LocationDate { posted_date, .. } | Self::Detailed { posted_date, .. } => {
                posted_date
            }
        }
    }

    /// Copies the parsed values into a record; sentinels leave it untouched.
    pub fn apply_to(self, record: &mut RawJobRecord) {
        match self {
            Self::LocationDate {
                location,
                posted_date,
            } => {
                record.set_field("location", location);
                record.set_field("posted_date", posted_date);
            }
            Self::Detailed {
                location,
                posted_date,
                experience,
                skills,
            } => {
                record.set_field("location", location);
                record.set_field("posted_date", posted_date);
                record.set_field("experience", experience);
                record.set_field("skills", skills);
            }
        }
    }
}

static POSTED_MONTH_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^Posted\s+([A-Za-z]{3,9} \d{1,2}, \d{4})(.*)"));

static EXPERIENCE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)Experience[:\s]*([\w\-\s]+?years?)"));
static REQUIRED_SKILL: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)Required Skill[:\s]*(.+)"));
static LEADING_LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"^([^,\n]+?)(?:\s+Full time|\s+Experience:|\s+Required Skill:|$)")
});

static LOCATION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)(?:locations?[:\s]*)(.*?)(?:\n|posted|date|\d+/\d+|\d+ days?|\d+ hours?|$)",
        r"(?i)(.*?)(?:\s*\n|\s*posted|\s*date|\s*\d+/\d+|\s*\d+ days?|\s*\d+ hours?)",
        r"(?i)^([^(\n]*?)(?:\s*\([^)]*\))?(?:\s*\n|$)",
    ]
    .into_iter()
    .map(compile)
    .collect()
});

static DATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)(?:posted|date)[:\s]*(\d{1,2}/\d{1,2}/\d{2,4})",
        r"(\d{1,2}/\d{1,2}/\d{2,4})",
        r"(?i)(\d+ days? ago)",
        r"(?i)(\d+ hours? ago)",
        r"(?i)(yesterday|today)",
        r"(?i)(?:posting dates?)(\d{1,2}/\d{1,2}/\d{2,4})",
    ]
    .into_iter()
    .map(compile)
    .collect()
});

static STARTS_WITH_DATE: LazyLock<Regex> = LazyLock::new(|| compile(r"^\d+[/\-]\d+"));
static TRAILING_PARENTHETICAL: LazyLock<Regex> = LazyLock::new(|| compile(r"\s*\(.*?\)\s*$"));
static TRAILING_WORK_MODE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\s*(hybrid|remote|on-?site)\s*$"));

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("hardcoded regex pattern is valid")
}

/// Extracts location, posted date and, for the detailed form, experience and
/// skills from a metadata text block.
pub fn parse_metadata(text: &str) -> ParsedMetadata {
    let text = text.trim();
    if text.is_empty() {
        return location_date(NOT_AVAILABLE, NOT_AVAILABLE);
    }

    if let Some(caps) = POSTED_MONTH_PREFIX.captures(text) {
        let posted_date = caps.get(1).map_or("", |m| m.as_str()).trim();
        let location = caps
            .get(2)
            .map_or("", |m| m.as_str())
            .trim_matches(|c| c == ' ' || c == ',');
        return location_date(location, posted_date);
    }

    if let Some(detailed) = parse_detailed(text) {
        return detailed;
    }

    location_date(&find_location(text), &find_posted_date(text))
}

fn parse_detailed(text: &str) -> Option<ParsedMetadata> {
    let experience = first_group(&EXPERIENCE, text);
    let skills = first_group(&REQUIRED_SKILL, text);
    if experience.is_none() && skills.is_none() {
        return None;
    }
    let location = first_group(&LEADING_LOCATION, text);
    let or_na = |value: Option<String>| value.unwrap_or_else(|| NOT_AVAILABLE.to_string());
    Some(ParsedMetadata::Detailed {
        location: or_na(location),
        posted_date: NOT_AVAILABLE.to_string(),
        experience: or_na(experience),
        skills: or_na(skills),
    })
}

fn find_location(text: &str) -> String {
    for pattern in LOCATION_PATTERNS.iter() {
        let Some(candidate) = first_group(pattern, text) else {
            continue;
        };
        if STARTS_WITH_DATE.is_match(&candidate) {
            continue;
        }
        let candidate = TRAILING_PARENTHETICAL.replace(&candidate, "");
        let candidate = TRAILING_WORK_MODE.replace(&candidate, "");
        let candidate = candidate.trim();
        if !candidate.is_empty() {
            return candidate.to_string();
        }
    }
    NOT_AVAILABLE.to_string()
}

fn find_posted_date(text: &str) -> String {
    DATE_PATTERNS
        .iter()
        .find_map(|pattern| first_group(pattern, text))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn first_group(pattern: &Regex, text: &str) -> Option<String> {
    let value = pattern.captures(text)?.get(1)?.as_str().trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn location_date(location: &str, posted_date: &str) -> ParsedMetadata {
    let or_na = |value: &str| {
        if value.is_empty() {
            NOT_AVAILABLE.to_string()
        } else {
            value.to_string()
        }
    };
    ParsedMetadata::LocationDate {
        location: or_na(location),
        posted_date: or_na(posted_date),
    }
}
