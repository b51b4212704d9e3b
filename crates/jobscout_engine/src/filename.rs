use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Windows-safe results filename:
/// `jobs_{sanitized_label}--{short_hash(source)}--{timestamp}.json`.
///
/// `source` identifies the companies file, so runs over different inputs
/// never overwrite each other even when their labels sanitise alike.
pub fn results_filename(label: &str, source: &str, generated_at: DateTime<Utc>) -> String {
    let sanitized = sanitize_label(label);
    let hash = short_hash(source);
    let stamp = generated_at.format("%Y%m%dT%H%M%SZ");
    format!("jobs_{sanitized}--{hash}--{stamp}.json")
}

fn sanitize_label(input: &str) -> String {
    let mut cleaned: String = input
        .chars()
        .map(|c| if is_forbidden(c) || c.is_whitespace() { '_' } else { c })
        .collect();
    cleaned = cleaned.trim_matches(&['_', '.'][..]).to_string();
    if cleaned.is_empty() {
        cleaned = "companies".to_string();
    }
    let mut compacted = String::with_capacity(cleaned.len());
    let mut prev_underscore = false;
    for c in cleaned.chars() {
        if c == '_' && prev_underscore {
            continue;
        }
        prev_underscore = c == '_';
        compacted.push(c);
    }
    let mut final_name: String = compacted.chars().take(60).collect();
    if is_reserved_windows_name(&final_name) {
        final_name.push('_');
    }
    final_name
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().take(4).map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn results_filename_is_stable_and_safe() {
        let at = Utc.with_ymd_and_hms(2025, 7, 22, 9, 30, 5).unwrap();
        let name = results_filename("my companies:v2", "/data/companies.json", at);
        assert!(name.starts_with("jobs_my_companies_v2--"));
        assert!(name.ends_with("--20250722T093005Z.json"));
        assert_eq!(name, results_filename("my companies:v2", "/data/companies.json", at));
        assert_ne!(name, results_filename("my companies:v2", "/other/companies.json", at));
    }

    #[test]
    fn reserved_and_empty_labels_are_rewritten() {
        assert_eq!(sanitize_label("con"), "con_");
        assert_eq!(sanitize_label("  ..  "), "companies");
    }
}
