//! Per-row quality validation: field-type detection (name first, then value
//! sniffing), per-type format checks that become warnings, and an overall
//! quality score annotated back onto the row.

use std::time::Instant;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use super::row::Row;
use super::ProcessingStats;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());
static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^https?://[^\s<>"{}|\\^`\[\]]+$"#).unwrap());
static DATE_RES: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(r"\d{4}-\d{2}-\d{2}").unwrap(),
        Regex::new(r"\d{2}/\d{2}/\d{4}").unwrap(),
        Regex::new(r"\d{2}-\d{2}-\d{4}").unwrap(),
    ]
});
static PRICE_SNIFF: Lazy<Regex> = Lazy::new(|| Regex::new(r"[$£€¥]|\d+\.\d{2}").unwrap());
static PHONE_SNIFF: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\d\s\-+()]+$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Email,
    Url,
    Phone,
    Price,
    Date,
    Text,
}

struct Validation {
    is_valid: bool,
    errors: Vec<String>,
    warnings: Vec<String>,
    quality_score: f64,
}

pub fn validate_rows(rows: Vec<Row>) -> (Vec<Row>, ProcessingStats) {
    let start = Instant::now();
    let mut stats = ProcessingStats { total: rows.len(), ..ProcessingStats::default() };
    let mut validated = Vec::with_capacity(rows.len());

    for mut row in rows {
        let verdict = validate_row(&row);
        row.insert("_validation_score", json!(verdict.quality_score));
        row.insert("_validation_errors", json!(verdict.errors));
        row.insert("_validation_warnings", json!(verdict.warnings));
        row.insert("_is_valid", json!(verdict.is_valid));

        stats.processed += 1;
        if !verdict.is_valid {
            stats.failed += 1;
        }
        validated.push(row);
    }

    stats.time = start.elapsed();
    (validated, stats)
}

fn validate_row(row: &Row) -> Validation {
    let content: Vec<(&String, &Value)> = row.content_fields().collect();
    if content.is_empty() {
        return Validation { is_valid: false, errors: vec!["no valid data fields found".into()], warnings: vec![], quality_score: 0.0 };
    }

    let mut warnings = Vec::new();
    let errors: Vec<String> = Vec::new();

    for (key, value) in &content {
        let Some(text) = value.as_str() else { continue };
        if text.is_empty() {
            continue;
        }
        match detect_field_kind(key, text) {
            FieldKind::Email if EMAIL_RE.find(text.trim()).is_none() => {
                warnings.push(format!("{key}: invalid email format"));
            }
            FieldKind::Url if URL_RE.find(text.trim()).is_none() => {
                warnings.push(format!("{key}: invalid url format"));
            }
            FieldKind::Phone if digits_only(text).len() < 10 => {
                warnings.push(format!("{key}: phone number too short"));
            }
            FieldKind::Price if parse_price(text).is_none() => {
                warnings.push(format!("{key}: invalid price format"));
            }
            FieldKind::Date if !DATE_RES.iter().any(|re| re.is_match(text)) => {
                warnings.push(format!("{key}: unrecognized date format"));
            }
            _ => {}
        }
    }

    let quality_score = quality_score(&content, warnings.len(), errors.len());
    let is_valid = errors.is_empty() && quality_score >= 0.5;

    Validation { is_valid, errors, warnings, quality_score }
}

fn detect_field_kind(field_name: &str, value: &str) -> FieldKind {
    let name = field_name.to_lowercase();
    let value_lower = value.to_lowercase();

    if name.contains("email") {
        FieldKind::Email
    } else if ["url", "link", "href"].iter().any(|s| name.contains(s)) {
        FieldKind::Url
    } else if ["phone", "tel", "mobile"].iter().any(|s| name.contains(s)) {
        FieldKind::Phone
    } else if ["price", "cost", "amount"].iter().any(|s| name.contains(s)) {
        FieldKind::Price
    } else if ["date", "time", "posted", "created"].iter().any(|s| name.contains(s)) {
        FieldKind::Date
    } else if value_lower.contains('@') {
        FieldKind::Email
    } else if value_lower.starts_with("http://") || value_lower.starts_with("https://") || value_lower.starts_with("www.") {
        FieldKind::Url
    } else if PHONE_SNIFF.is_match(&value_lower) && value_lower.len() >= 10 {
        FieldKind::Phone
    } else if PRICE_SNIFF.is_match(&value_lower) {
        FieldKind::Price
    } else {
        FieldKind::Text
    }
}

fn digits_only(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

fn parse_price(value: &str) -> Option<f64> {
    let cleaned: String = value.chars().filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',').collect();
    cleaned.replace(',', "").parse::<f64>().ok().filter(|v| *v >= 0.0)
}

/// `quality_score = clamp(completeness - min(0.1*warnings, 0.5) - min(0.2*errors, 0.8), 0, 1)`
fn quality_score(content: &[(&String, &Value)], warning_count: usize, error_count: usize) -> f64 {
    let non_empty = content
        .iter()
        .filter(|(_, v)| match v {
            Value::String(s) => !s.trim().is_empty(),
            Value::Null => false,
            _ => true,
        })
        .count();
    let completeness = non_empty as f64 / content.len().max(1) as f64;

    let warning_penalty = (0.1 * warning_count as f64).min(0.5);
    let error_penalty = (0.2 * error_count as f64).min(0.8);

    (completeness - warning_penalty - error_penalty).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row_with(pairs: &[(&str, &str)]) -> Row {
        let mut row = Row::new();
        for (k, v) in pairs {
            row.insert(*k, json!(v));
        }
        row
    }

    #[test]
    fn complete_row_with_no_warnings_is_valid() {
        let row = row_with(&[("title", "Widget"), ("price", "19.99")]);
        let verdict = validate_row(&row);
        assert!(verdict.is_valid);
        assert_eq!(verdict.quality_score, 1.0);
    }

    #[test]
    fn empty_row_is_invalid() {
        let row = Row::new();
        let verdict = validate_row(&row);
        assert!(!verdict.is_valid);
        assert_eq!(verdict.quality_score, 0.0);
    }

    #[test]
    fn bad_email_format_is_a_warning_not_an_error() {
        let row = row_with(&[("title", "Widget"), ("email", "not-an-email")]);
        let verdict = validate_row(&row);
        assert!(verdict.errors.is_empty());
        assert_eq!(verdict.warnings.len(), 1);
    }

    #[test]
    fn many_warnings_cap_penalty_at_point_five() {
        let row = row_with(&[
            ("email1_email", "bad"),
            ("email2_email", "bad"),
            ("email3_email", "bad"),
            ("email4_email", "bad"),
            ("email5_email", "bad"),
            ("email6_email", "bad"),
        ]);
        let verdict = validate_row(&row);
        assert_eq!(verdict.warnings.len(), 6);
        assert_eq!(verdict.quality_score, 0.5);
    }

    #[test]
    fn validate_rows_annotates_metadata_keys() {
        let (rows, stats) = validate_rows(vec![row_with(&[("title", "Widget")])]);
        assert_eq!(stats.processed, 1);
        assert!(rows[0].get("_validation_score").is_some());
        assert_eq!(rows[0].get("_is_valid").unwrap(), true);
    }
}
