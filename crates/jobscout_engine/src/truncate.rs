/// Keeps at most `max_chars` characters of `text`, never splitting a
/// multi-byte character.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

/// Caps the long detail fields. Other fields pass through.
pub fn cap_detail_field(field: &str, value: String, description_max: usize, requirements_max: usize) -> String {
    match field {
        "description" => truncate_chars(&value, description_max),
        "requirements" | "qualifications" => truncate_chars(&value, requirements_max),
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::{cap_detail_field, truncate_chars};

    #[test]
    fn short_text_kept_as_is() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("exact", 5), "exact");
    }

    #[test]
    fn long_text_cut_on_char_boundary() {
        let text = "é".repeat(8);
        let cut = truncate_chars(&text, 5);
        assert_eq!(cut.chars().count(), 5);
        assert_eq!(cut.len(), 10);
    }

    #[test]
    fn only_long_fields_are_capped() {
        let long = "a".repeat(6000);
        assert_eq!(cap_detail_field("description", long.clone(), 5000, 3000).len(), 5000);
        assert_eq!(cap_detail_field("requirements", long.clone(), 5000, 3000).len(), 3000);
        assert_eq!(cap_detail_field("title", long, 5000, 3000).len(), 6000);
    }
}
