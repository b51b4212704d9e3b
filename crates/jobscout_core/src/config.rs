//! Per-site selector configuration and normalisation of the raw companies file.
//!
//! Company records arrive as loosely-typed JSON with several historical field
//! spellings. [`normalize_company`] resolves aliases, fills defaults and
//! validates the result into an immutable [`SelectorConfig`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

pub const DEFAULT_MAX_PAGES: u32 = 5000;
pub const DEFAULT_MAX_JOBS: usize = 100_000;
pub const DEFAULT_SCROLL_PAUSE_MS: u64 = 2000;
pub const DEFAULT_PAGINATION_PARAM: &str = "page";
pub const DEFAULT_PAGINATION_STEP: u32 = 1;

/// Detail container used when a detail-navigation site configures none.
pub const DEFAULT_DETAIL_CONTAINER: &str = ".position-container";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("companies file is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("companies file must be a JSON array or an object with a `companies` map")]
    UnexpectedShape,
    #[error("company entry #{index} is not a JSON object")]
    NotAnObject { index: usize },
    #[error("{company}: missing required field `{field}`")]
    MissingField { company: String, field: &'static str },
    #[error("{company}: invalid url `{url}`: {message}")]
    InvalidUrl {
        company: String,
        url: String,
        message: String,
    },
    #[error("{company}: unknown pagination type `{value}`")]
    UnknownPaginationType { company: String, value: String },
    #[error("{company}: metadata parsing enabled without a metadata selector")]
    MetadataSelectorRequired { company: String },
    #[error("{company}: field `{field}` has an invalid value")]
    InvalidValue { company: String, field: &'static str },
}

impl ConfigError {
    /// Company the error belongs to, when the entry got far enough to name one.
    pub fn company(&self) -> Option<&str> {
        match self {
            ConfigError::MissingField { company, .. }
            | ConfigError::InvalidUrl { company, .. }
            | ConfigError::UnknownPaginationType { company, .. }
            | ConfigError::MetadataSelectorRequired { company }
            | ConfigError::InvalidValue { company, .. } => Some(company),
            ConfigError::InvalidJson(_)
            | ConfigError::UnexpectedShape
            | ConfigError::NotAnObject { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationType {
    None,
    ButtonClick,
    InfiniteScroll,
    UrlParam,
    LoadMoreProgressive,
}

impl PaginationType {
    /// Resolves canonical names and the aliases found in older config files.
    /// The returned flag is true for `one_page`, which also pins `max_pages` to 1.
    pub fn from_alias(raw: &str) -> Option<(Self, bool)> {
        let kind = match raw.trim() {
            "none" => (Self::None, false),
            "one_page" => (Self::None, true),
            "button_click" | "button" => (Self::ButtonClick, false),
            "infinite_scroll" | "scroll" => (Self::InfiniteScroll, false),
            "url_param" => (Self::UrlParam, false),
            "load_more_progressive" | "load_more" | "Load_more" => {
                (Self::LoadMoreProgressive, false)
            }
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ButtonClick => "button_click",
            Self::InfiniteScroll => "infinite_scroll",
            Self::UrlParam => "url_param",
            Self::LoadMoreProgressive => "load_more_progressive",
        }
    }
}

impl std::fmt::Display for PaginationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigDefaults {
    pub max_pages: u32,
    pub max_jobs: usize,
    pub scroll_pause_ms: u64,
}

impl Default for ConfigDefaults {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            max_jobs: DEFAULT_MAX_JOBS,
            scroll_pause_ms: DEFAULT_SCROLL_PAUSE_MS,
        }
    }
}

/// Validated selector configuration for one site. Read-only for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectorConfig {
    pub company_name: String,
    pub url: String,
    pub card_selector: String,
    pub title_selector: String,
    pub location_selector: String,
    pub posted_selector: String,
    pub link_selector: String,
    pub description_selector: String,
    pub metadata_selector: Option<String>,
    pub pagination_type: PaginationType,
    pub pagination_selector: String,
    pub pagination_param: String,
    pub pagination_step: u32,
    pub max_pages: u32,
    pub max_jobs: usize,
    pub scroll_pause_ms: u64,
    pub use_metadata_parsing: bool,
    pub cookie_handling: bool,
    pub click_target_selector: Option<String>,
    pub detail_container_selector: Option<String>,
    /// Field name to ordered fallback selectors.
    pub detail_selectors: BTreeMap<String, Vec<String>>,
}

impl SelectorConfig {
    pub fn new(
        company_name: impl Into<String>,
        url: impl Into<String>,
        card_selector: impl Into<String>,
    ) -> Self {
        Self {
            company_name: company_name.into(),
            url: url.into(),
            card_selector: card_selector.into(),
            title_selector: String::new(),
            location_selector: String::new(),
            posted_selector: String::new(),
            link_selector: String::new(),
            description_selector: String::new(),
            metadata_selector: None,
            pagination_type: PaginationType::None,
            pagination_selector: String::new(),
            pagination_param: DEFAULT_PAGINATION_PARAM.to_string(),
            pagination_step: DEFAULT_PAGINATION_STEP,
            max_pages: DEFAULT_MAX_PAGES,
            max_jobs: DEFAULT_MAX_JOBS,
            scroll_pause_ms: DEFAULT_SCROLL_PAUSE_MS,
            use_metadata_parsing: false,
            cookie_handling: true,
            click_target_selector: None,
            detail_container_selector: None,
            detail_selectors: BTreeMap::new(),
        }
    }

    /// Sites whose listing cards carry no usable link need a click per card.
    pub fn requires_detail_navigation(&self) -> bool {
        self.detail_container_selector
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let company = self.company_name.clone();
        if self.card_selector.trim().is_empty() {
            return Err(ConfigError::MissingField {
                company,
                field: "card_selector",
            });
        }
        if self.url.trim().is_empty() {
            return Err(ConfigError::MissingField {
                company,
                field: "url",
            });
        }
        if let Err(err) = Url::parse(self.url.trim()) {
            return Err(ConfigError::InvalidUrl {
                company,
                url: self.url.clone(),
                message: err.to_string(),
            });
        }
        let has_metadata = self
            .metadata_selector
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty());
        if self.use_metadata_parsing && !has_metadata {
            return Err(ConfigError::MetadataSelectorRequired { company });
        }
        if self.pagination_step == 0 {
            return Err(ConfigError::InvalidValue {
                company,
                field: "pagination_step",
            });
        }
        Ok(())
    }
}

/// Parses a companies file and normalises every entry.
///
/// Accepts either a JSON array of company objects or an object whose
/// `companies` member maps names to company objects. The outer error covers
/// the whole file; each entry carries its own result so one bad site does not
/// discard the rest.
pub fn load_company_configs(
    text: &str,
    defaults: &ConfigDefaults,
) -> Result<Vec<Result<SelectorConfig, ConfigError>>, ConfigError> {
    let root: Value =
        serde_json::from_str(text).map_err(|err| ConfigError::InvalidJson(err.to_string()))?;

    let entries: Vec<Value> = match root {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("companies") {
            Some(Value::Object(companies)) => companies
                .into_iter()
                .map(|(name, mut entry)| {
                    if let Value::Object(fields) = &mut entry {
                        fields
                            .entry("company_name")
                            .or_insert_with(|| Value::String(name));
                    }
                    entry
                })
                .collect(),
            Some(Value::Array(items)) => items,
            _ => return Err(ConfigError::UnexpectedShape),
        },
        _ => return Err(ConfigError::UnexpectedShape),
    };

    Ok(entries
        .iter()
        .enumerate()
        .map(|(index, entry)| normalize_company(index, entry, defaults))
        .collect())
}

pub fn normalize_company(
    index: usize,
    raw: &Value,
    defaults: &ConfigDefaults,
) -> Result<SelectorConfig, ConfigError> {
    let fields = raw.as_object().ok_or(ConfigError::NotAnObject { index })?;

    let company_name = text_field(fields, &["company_name", "company", "name"])
        .unwrap_or_else(|| format!("company-{index}"));
    let url = text_field(fields, &["url"]).ok_or_else(|| ConfigError::MissingField {
        company: company_name.clone(),
        field: "url",
    })?;
    let card_selector = text_field(fields, &["card_selector", "job_card"]).ok_or_else(|| {
        ConfigError::MissingField {
            company: company_name.clone(),
            field: "card_selector",
        }
    })?;

    let mut config = SelectorConfig::new(company_name.clone(), url, card_selector);
    config.title_selector = text_field(fields, &["title_selector", "title"]).unwrap_or_default();
    config.location_selector =
        text_field(fields, &["location_selector", "location"]).unwrap_or_default();
    config.posted_selector = text_field(fields, &["posted_selector", "posted"]).unwrap_or_default();
    config.link_selector = text_field(fields, &["link_selector", "link"]).unwrap_or_default();
    config.description_selector =
        text_field(fields, &["description_selector", "description"]).unwrap_or_default();
    config.metadata_selector = text_field(fields, &["metadata_selector", "metadata"]);
    config.pagination_selector = text_field(fields, &["pagination_selector"]).unwrap_or_default();
    config.click_target_selector = text_field(fields, &["click_target_selector", "click_target"]);
    config.detail_container_selector =
        text_field(fields, &["detail_container_selector", "detail_container"]);

    let special_case = bool_field(fields, "special_case").unwrap_or(false);
    if special_case {
        if config.detail_container_selector.is_none() {
            config.detail_container_selector = Some(DEFAULT_DETAIL_CONTAINER.to_string());
        }
        if config.click_target_selector.is_none() && !config.title_selector.is_empty() {
            config.click_target_selector = Some(config.title_selector.clone());
        }
    }

    let raw_pagination = text_field(fields, &["pagination_type"]);
    let (pagination_type, single_page) = match raw_pagination.as_deref() {
        Some(value) => PaginationType::from_alias(value).ok_or_else(|| {
            ConfigError::UnknownPaginationType {
                company: company_name.clone(),
                value: value.to_string(),
            }
        })?,
        None if special_case => (PaginationType::LoadMoreProgressive, false),
        None => (PaginationType::None, false),
    };
    config.pagination_type = pagination_type;

    config.pagination_param =
        text_field(fields, &["pagination_param"]).unwrap_or_else(|| DEFAULT_PAGINATION_PARAM.into());
    config.pagination_step =
        uint_field(fields, "pagination_step", &company_name)?.unwrap_or(DEFAULT_PAGINATION_STEP);
    config.max_pages = if single_page {
        1
    } else {
        uint_field(fields, "max_pages", &company_name)?.unwrap_or(defaults.max_pages)
    };
    config.max_jobs = uint_field(fields, "max_jobs", &company_name)?.unwrap_or(defaults.max_jobs);
    config.scroll_pause_ms = scroll_pause_ms(fields, &company_name)?.unwrap_or(defaults.scroll_pause_ms);

    config.use_metadata_parsing = bool_field(fields, "use_metadata_parsing")
        .unwrap_or_else(|| config.metadata_selector.is_some());
    config.cookie_handling = bool_field(fields, "cookie_handling").unwrap_or(true);

    config.detail_selectors = match fields.get("detail_selectors") {
        Some(Value::Object(map)) => detail_selector_map(map),
        _ if config.requires_detail_navigation() => default_detail_selectors(&config),
        _ => BTreeMap::new(),
    };

    config.validate()?;
    Ok(config)
}

/// Fallback lists seeded for detail-navigation sites without explicit ones.
pub fn default_detail_selectors(config: &SelectorConfig) -> BTreeMap<String, Vec<String>> {
    let chain = |primary: &str, rest: &[&str]| -> Vec<String> {
        std::iter::once(primary)
            .chain(rest.iter().copied())
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .collect()
    };

    let mut map = BTreeMap::new();
    map.insert(
        "title".to_string(),
        chain(&config.title_selector, &["h1", ".job-title"]),
    );
    map.insert(
        "description".to_string(),
        chain(
            &config.description_selector,
            &[
                ".position-job-description",
                "[data-automation-id='jobPostingDescription']",
                ".job-description",
            ],
        ),
    );
    map.insert(
        "requirements".to_string(),
        chain("", &[".qualifications", ".requirements", "[class*='requirement']"]),
    );
    map.insert(
        "location".to_string(),
        chain(&config.location_selector, &["[class*='location']"]),
    );
    map.insert(
        "employment_type".to_string(),
        chain("", &[".employment-type", "[class*='employment']"]),
    );
    map.insert(
        "posted_date".to_string(),
        chain(&config.posted_selector, &[".posted-date", "[class*='posted']"]),
    );
    map
}

fn text_field(fields: &Map<String, Value>, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match fields.get(*name) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    })
}

fn bool_field(fields: &Map<String, Value>, name: &str) -> Option<bool> {
    match fields.get(name) {
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn uint_field<T: TryFrom<u64>>(
    fields: &Map<String, Value>,
    name: &'static str,
    company: &str,
) -> Result<Option<T>, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        company: company.to_string(),
        field: name,
    };
    let raw = match fields.get(name) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_u64().ok_or_else(invalid)?,
        Some(Value::String(s)) => s.trim().parse::<u64>().map_err(|_| invalid())?,
        Some(_) => return Err(invalid()),
    };
    T::try_from(raw).map(Some).map_err(|_| invalid())
}

/// `scroll_pause_ms` wins; the legacy `scroll_pause` is in seconds.
fn scroll_pause_ms(fields: &Map<String, Value>, company: &str) -> Result<Option<u64>, ConfigError> {
    if let Some(ms) = uint_field(fields, "scroll_pause_ms", company)? {
        return Ok(Some(ms));
    }
    match fields.get("scroll_pause") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(secs) if secs >= 0.0 => Ok(Some((secs * 1000.0).round() as u64)),
            _ => Err(ConfigError::InvalidValue {
                company: company.to_string(),
                field: "scroll_pause",
            }),
        },
        Some(_) => Err(ConfigError::InvalidValue {
            company: company.to_string(),
            field: "scroll_pause",
        }),
    }
}

fn detail_selector_map(map: &Map<String, Value>) -> BTreeMap<String, Vec<String>> {
    map.iter()
        .filter_map(|(field, value)| {
            let selectors: Vec<String> = match value {
                Value::String(s) => vec![s.clone()],
                Value::Array(items) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
                _ => Vec::new(),
            };
            let selectors: Vec<String> = selectors
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            (!selectors.is_empty()).then(|| (field.clone(), selectors))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_scroll_pause_is_converted_from_seconds() {
        let fields = serde_json::json!({ "scroll_pause": 1.5 });
        let fields = fields.as_object().unwrap();
        assert_eq!(scroll_pause_ms(fields, "acme").unwrap(), Some(1500));
    }

    #[test]
    fn blank_text_fields_fall_through_to_aliases() {
        let fields = serde_json::json!({ "card_selector": "  ", "job_card": ".card" });
        let fields = fields.as_object().unwrap();
        assert_eq!(
            text_field(fields, &["card_selector", "job_card"]).as_deref(),
            Some(".card")
        );
    }

    #[test]
    fn detail_selector_map_accepts_strings_and_lists() {
        let value = serde_json::json!({
            "title": "h1",
            "description": [".desc", "", ".body"],
            "empty": []
        });
        let map = detail_selector_map(value.as_object().unwrap());
        assert_eq!(map.get("title"), Some(&vec!["h1".to_string()]));
        assert_eq!(
            map.get("description"),
            Some(&vec![".desc".to_string(), ".body".to_string()])
        );
        assert!(!map.contains_key("empty"));
    }
}
