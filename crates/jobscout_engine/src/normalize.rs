//! Optional LLM clean-up of raw records. The raw record is always the
//! fallback: a failed normalisation never loses a job.

use std::time::Duration;

use async_trait::async_trait;
use engine_logging::{engine_debug, engine_warn};
use jobscout_core::{ExtractionStats, RawJobRecord, NOT_AVAILABLE};
use serde_json::{json, Map, Value};

pub const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
pub const GEMINI_MODEL: &str = "gemini-2.0-flash";

/// Fields that always exist in a normalised job, copied from the raw record
/// when the model leaves them out.
const REQUIRED_FIELDS: &[&str] = &["title", "company", "location", "posted_date", "apply_link"];

const ARRAY_FIELDS: &[&str] = &[
    "requirements",
    "preferred_qualifications",
    "responsibilities",
    "benefits",
    "skills",
    "tags",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("normaliser request failed: {0}")]
    Request(String),
    #[error("normaliser returned http status {0}")]
    Status(u16),
    #[error("normaliser response had no text")]
    EmptyResponse,
    #[error("normaliser output is not a JSON object: {0}")]
    InvalidJson(String),
}

#[async_trait]
pub trait Normalizer: Send + Sync {
    async fn normalize(&self, record: &RawJobRecord) -> Result<Value, NormalizeError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNormalizer;

#[async_trait]
impl Normalizer for NoopNormalizer {
    async fn normalize(&self, record: &RawJobRecord) -> Result<Value, NormalizeError> {
        Ok(raw_value(record))
    }
}

/// Normaliser backed by the Gemini `generateContent` REST endpoint.
#[derive(Debug, Clone)]
pub struct GeminiNormalizer {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl GeminiNormalizer {
    pub fn new(api_key: impl Into<String>) -> Result<Self, NormalizeError> {
        Self::with_endpoint(api_key, GEMINI_ENDPOINT, GEMINI_MODEL)
    }

    pub fn with_endpoint(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, NormalizeError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| NormalizeError::Request(err.to_string()))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    async fn generate(&self, prompt: String) -> Result<String, NormalizeError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, self.model
        );
        let body = json!({ "contents": [{ "parts": [{ "text": prompt }] }] });
        let response = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|err| NormalizeError::Request(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NormalizeError::Status(status.as_u16()));
        }
        let payload: Value = response
            .json()
            .await
            .map_err(|err| NormalizeError::Request(err.to_string()))?;

        payload
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(NormalizeError::EmptyResponse)
    }
}

#[async_trait]
impl Normalizer for GeminiNormalizer {
    async fn normalize(&self, record: &RawJobRecord) -> Result<Value, NormalizeError> {
        let text = self.generate(build_prompt(record)).await?;
        let parsed: Value = serde_json::from_str(strip_code_fences(&text))
            .map_err(|err| NormalizeError::InvalidJson(err.to_string()))?;
        match parsed {
            Value::Object(fields) => Ok(merge_normalized(record, fields)),
            other => Err(NormalizeError::InvalidJson(format!(
                "expected object, got {}",
                type_name(&other)
            ))),
        }
    }
}

/// Runs the normaliser over one record, falling back to the raw record and
/// counting the failure.
pub async fn normalize_or_raw(
    normalizer: &dyn Normalizer,
    record: &RawJobRecord,
    stats: &mut ExtractionStats,
) -> Value {
    match normalizer.normalize(record).await {
        Ok(value) => value,
        Err(err) => {
            engine_warn!("Normalisation failed for '{}': {}", record.title, err);
            stats.normalization_errors += 1;
            let mut value = raw_value(record);
            if let Value::Object(fields) = &mut value {
                fields.insert("normalization_error".into(), Value::String(err.to_string()));
            }
            value
        }
    }
}

fn raw_value(record: &RawJobRecord) -> Value {
    serde_json::to_value(record).unwrap_or_else(|err| {
        engine_debug!("Raw record did not serialise: {}", err);
        Value::Object(Map::new())
    })
}

/// Removes a surrounding markdown code fence, with or without a `json` tag.
pub fn strip_code_fences(text: &str) -> &str {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```json") {
        body = rest;
    } else if let Some(rest) = body.strip_prefix("```") {
        body = rest;
    }
    if let Some(rest) = body.strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

/// Overlays model output on the raw record's provenance fields and coerces
/// list fields to arrays.
pub fn merge_normalized(record: &RawJobRecord, mut fields: Map<String, Value>) -> Value {
    let raw = raw_value(record);
    for field in REQUIRED_FIELDS {
        let missing = fields.get(*field).is_none_or(Value::is_null);
        if missing {
            let fallback = raw.get(*field).cloned().unwrap_or(Value::Null);
            fields.insert((*field).to_string(), fallback);
        }
    }

    for field in ARRAY_FIELDS {
        let coerced = match fields.remove(*field) {
            Some(Value::Array(items)) => Value::Array(items),
            Some(Value::String(text)) => Value::Array(split_list(&text)),
            _ => Value::Array(Vec::new()),
        };
        fields.insert((*field).to_string(), coerced);
    }

    fields.insert("source_url".into(), Value::String(record.source_url.clone()));
    fields.insert("scraped_at".into(), Value::String(record.scraped_at.clone()));
    fields.insert("detail_info".into(), Value::String(record.detail_info.clone()));
    fields.insert("page_number".into(), Value::from(record.page_number));
    Value::Object(fields)
}

fn split_list(text: &str) -> Vec<Value> {
    let text = text.trim();
    if text.is_empty() || text == NOT_AVAILABLE {
        return Vec::new();
    }
    text.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| Value::String(item.to_string()))
        .collect()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn build_prompt(record: &RawJobRecord) -> String {
    let raw = serde_json::to_string_pretty(&cleaned_input(record)).unwrap_or_default();
    format!(
        "You are a job data analyst. Turn the scraped job below into one clean JSON object.\n\
         \n\
         RAW JOB DATA:\n{raw}\n\
         \n\
         Return these fields: title, company, location, posted_date (MM/DD/YYYY or \"N/A\"), \
         apply_link, experience, job_id, department, employment_type, experience_level, \
         remote_work, salary, deadline, description (short and clean), and the arrays \
         requirements, preferred_qualifications, responsibilities, benefits, skills, tags.\n\
         Use null for missing values. Derive skills from the description and requirements. \
         Strip HTML and extra whitespace.\n\
         \n\
         OUTPUT: only the JSON object, without markdown or commentary."
    )
}

fn cleaned_input(record: &RawJobRecord) -> Value {
    let mut input = json!({
        "title": record.title,
        "company": record.company,
        "location": record.location,
        "posted_date": record.posted_date,
        "apply_link": record.apply_link,
        "description": record.description,
        "detail_info": record.detail_info,
        "source_url": record.source_url,
    });
    let optional = [
        ("job_id", &record.job_id),
        ("department", &record.department),
        ("employment_type", &record.employment_type),
        ("experience_level", &record.experience_level),
        ("remote_work", &record.remote_work),
        ("salary", &record.salary),
        ("deadline", &record.deadline),
        ("requirements", &record.requirements),
        ("benefits", &record.benefits),
        ("skills", &record.skills),
        ("experience", &record.experience),
    ];
    if let Value::Object(fields) = &mut input {
        for (name, value) in optional {
            if jobscout_core::is_available(value) {
                fields.insert(name.to_string(), Value::String(value.clone()));
            }
        }
    }
    input
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tagged_and_bare_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn merge_fills_required_fields_and_coerces_lists() {
        let mut record = RawJobRecord::new("Acme", "https://acme.example/jobs", 2);
        record.title = "Engineer".into();
        record.apply_link = "https://acme.example/jobs/1".into();

        let model = json!({ "title": "Software Engineer", "skills": "Rust, Tokio", "tags": null });
        let Value::Object(fields) = model else {
            unreachable!()
        };
        let merged = merge_normalized(&record, fields);

        assert_eq!(merged["title"], "Software Engineer");
        assert_eq!(merged["company"], "Acme");
        assert_eq!(merged["apply_link"], "https://acme.example/jobs/1");
        assert_eq!(merged["skills"], json!(["Rust", "Tokio"]));
        assert_eq!(merged["tags"], json!([]));
        assert_eq!(merged["page_number"], 2);
    }
}
