use jobscout_core::{parse_metadata, ParsedMetadata, RawJobRecord, NOT_AVAILABLE};
use pretty_assertions::assert_eq;

fn location_date(location: &str, posted_date: &str) -> ParsedMetadata {
    ParsedMetadata::LocationDate {
        location: location.to_string(),
        posted_date: posted_date.to_string(),
    }
}

#[test]
fn posted_month_prefix_splits_glued_location() {
    assert_eq!(
        parse_metadata("Posted Jul 22, 2025Chennai, India"),
        location_date("Chennai, India", "Jul 22, 2025")
    );
}

#[test]
fn experience_and_skill_markers_produce_detailed_form() {
    assert_eq!(
        parse_metadata("Bengaluru Full time Experience: 10-12 years Required Skill: SAP ABAP"),
        ParsedMetadata::Detailed {
            location: "Bengaluru".to_string(),
            posted_date: NOT_AVAILABLE.to_string(),
            experience: "10-12 years".to_string(),
            skills: "SAP ABAP".to_string(),
        }
    );
}

#[test]
fn labelled_location_and_posting_dates() {
    assert_eq!(
        parse_metadata("Locations\nIndia\n\n\nPosting Dates07/16/2025"),
        location_date("India", "07/16/2025")
    );
}

#[test]
fn first_line_location_drops_parenthetical_and_relative_date() {
    assert_eq!(
        parse_metadata("Hyderabad, India (Hybrid)\nPosted 3 days ago"),
        location_date("Hyderabad, India", "3 days ago")
    );
}

#[test]
fn trailing_work_mode_is_stripped() {
    let parsed = parse_metadata("Austin, TX Remote\nToday");
    assert_eq!(parsed.location(), "Austin, TX");
    assert_eq!(parsed.posted_date(), "Today");
}

#[test]
fn empty_and_whitespace_input_yields_sentinels() {
    assert_eq!(parse_metadata(""), location_date(NOT_AVAILABLE, NOT_AVAILABLE));
    assert_eq!(
        parse_metadata("  \n\t "),
        location_date(NOT_AVAILABLE, NOT_AVAILABLE)
    );
}

#[test]
fn detailed_form_fills_record_without_touching_posted_date() {
    let mut record = RawJobRecord::new("Acme", "https://acme.example/jobs", 1);
    parse_metadata("Pune Experience: 3 years").apply_to(&mut record);

    assert_eq!(record.location, "Pune");
    assert_eq!(record.experience, "3 years");
    assert_eq!(record.skills, NOT_AVAILABLE);
    assert_eq!(record.posted_date, NOT_AVAILABLE);
}

#[test]
fn arbitrary_text_never_panics() {
    for text in [
        "(((",
        "12/12",
        "Posted",
        "Experience:",
        "Required Skill:",
        "Location: \n",
        "ünïcödé 🚀 1 hour ago",
    ] {
        let parsed = parse_metadata(text);
        assert!(!parsed.location().is_empty());
        assert!(!parsed.posted_date().is_empty());
    }
}
