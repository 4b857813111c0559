//! Stateless per-row cleaning: normalizes whitespace and HTML entities for
//! general text, and applies field-class-specific rules (price, URL, email,
//! phone) inferred from the field's key.

use std::time::Instant;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::row::Row;
use super::ProcessingStats;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static CONTROL_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\x00-\x1f\x7f-\x9f]").unwrap());
static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b").unwrap());
static NON_DIGIT_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\d.,]").unwrap());
static NON_DIGIT_PLUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\d+]").unwrap());
static DUPLICATE_SLASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?P<scheme>[a-zA-Z][a-zA-Z0-9+.-]*://)|//+").unwrap());

/// Cleans and normalizes a batch of rows, returning the cleaned rows plus
/// per-run statistics. Cleaning never fails outright: a row that can't be
/// cleaned is passed through unchanged and counted as failed.
pub fn clean_rows(rows: Vec<Row>) -> (Vec<Row>, ProcessingStats) {
    let start = Instant::now();
    let mut stats = ProcessingStats { total: rows.len(), ..ProcessingStats::default() };
    let mut cleaned = Vec::with_capacity(rows.len());

    for row in rows {
        let original = row.clone();
        match clean_row(row) {
            Ok(row) => {
                stats.processed += 1;
                if row != original {
                    stats.modifications += 1;
                }
                cleaned.push(row);
            }
            Err(err) => {
                stats.failed += 1;
                stats.push_error(format!("failed to clean row: {err}"));
                cleaned.push(original);
            }
        }
    }

    stats.time = start.elapsed();
    (cleaned, stats)
}

fn clean_row(row: Row) -> Result<Row, std::convert::Infallible> {
    let mut cleaned = Row::new();
    for (key, value) in row.0 {
        if Row::is_metadata_key(&key) {
            cleaned.insert(key, value);
            continue;
        }

        let cleaned_value = match value {
            Value::String(text) => Value::String(clean_field(&key, &text)),
            other => other,
        };
        cleaned.insert(key, cleaned_value);
    }
    Ok(cleaned)
}

fn clean_field(key: &str, value: &str) -> String {
    let key_lower = key.to_lowercase();
    if key_lower.contains("price") || key_lower.contains("cost") || value.contains('$') {
        clean_price(value)
    } else if key_lower.contains("url") || key_lower.contains("link") {
        clean_url(value)
    } else if key_lower.contains("email") {
        clean_email(value)
    } else if key_lower.contains("phone") {
        clean_phone(value)
    } else {
        clean_text(value)
    }
}

fn clean_text(text: &str) -> String {
    let decoded = decode_html_entities(text);
    let no_control = CONTROL_CHARS.replace_all(&decoded, "");
    WHITESPACE.replace_all(no_control.trim(), " ").into_owned()
}

/// Decodes to a fixed point (bounded, so a string engineered to keep
/// unfolding can't spin forever): `&amp;amp;nbsp;` needs two passes to reach
/// a plain space, and `clean(clean(x)) = clean(x)` only holds if the first
/// pass already lands on what a second pass would produce.
fn decode_html_entities(text: &str) -> String {
    let mut current = text.to_string();
    for _ in 0..4 {
        let next = decode_html_entities_once(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn decode_html_entities_once(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

/// Price cleaning with positional comma/period disambiguation: a comma
/// before a later period is a thousands separator; a lone comma followed by
/// at most two digits is a decimal separator; otherwise commas are noise.
fn clean_price(value: &str) -> String {
    let stripped = NON_DIGIT_SEPARATOR.replace_all(value, "");
    let trimmed = stripped.trim_matches(',').to_string();

    let normalized = if trimmed.contains(',') && trimmed.contains('.') {
        if trimmed.rfind(',').unwrap() < trimmed.rfind('.').unwrap() {
            trimmed.replace(',', "")
        } else {
            trimmed.clone()
        }
    } else if trimmed.matches(',').count() == 1 && !trimmed.contains('.') {
        let decimals = trimmed.split(',').nth(1).unwrap_or_default();
        if decimals.len() <= 2 {
            trimmed.replace(',', ".")
        } else {
            trimmed.replace(',', "")
        }
    } else {
        trimmed.clone()
    };

    if normalized.parse::<f64>().is_ok() {
        normalized
    } else {
        value.to_string()
    }
}

fn clean_url(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let mut cleaned = match trimmed.strip_prefix("//") {
        Some(rest) => format!("https://{rest}"),
        None => trimmed.to_string(),
    };

    cleaned = DUPLICATE_SLASHES
        .replace_all(&cleaned, |caps: &regex::Captures| {
            caps.name("scheme").map(|m| m.as_str().to_string()).unwrap_or_else(|| "/".to_string())
        })
        .into_owned();

    if !cleaned.starts_with("http://")
        && !cleaned.starts_with("https://")
        && !cleaned.starts_with('/')
    {
        cleaned = format!("https://{cleaned}");
    }

    cleaned
}

fn clean_email(value: &str) -> String {
    let lowered = clean_text(value).to_lowercase();
    EMAIL_PATTERN
        .find(&lowered)
        .map(|m| m.as_str().to_string())
        .unwrap_or(lowered)
}

fn clean_phone(value: &str) -> String {
    let digits = NON_DIGIT_PLUS.replace_all(value, "").into_owned();
    if digits.starts_with('+') {
        digits
    } else if digits.len() == 10 {
        format!("+1{digits}")
    } else if digits.len() == 11 && digits.starts_with('1') {
        format!("+{digits}")
    } else {
        digits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row_with(key: &str, value: &str) -> Row {
        let mut row = Row::new();
        row.insert(key, json!(value));
        row
    }

    #[test]
    fn thousands_comma_before_decimal_point_is_stripped() {
        assert_eq!(clean_price("$1,234.56"), "1234.56");
    }

    #[test]
    fn lone_comma_with_two_trailing_digits_is_decimal() {
        assert_eq!(clean_price("19,99"), "19.99");
    }

    #[test]
    fn lone_comma_with_many_trailing_digits_is_thousands() {
        assert_eq!(clean_price("1,234"), "1234");
    }

    #[test]
    fn url_gets_https_scheme_and_collapsed_slashes() {
        assert_eq!(clean_url("example.com//path///to//page"), "https://example.com/path/to/page");
    }

    #[test]
    fn protocol_relative_url_becomes_https() {
        assert_eq!(clean_url("//example.com/path"), "https://example.com/path");
    }

    #[test]
    fn email_is_lowercased_and_extracted() {
        assert_eq!(clean_email("  Contact: Jane.Doe@Example.COM please "), "jane.doe@example.com");
    }

    #[test]
    fn ten_digit_phone_gets_us_country_code() {
        assert_eq!(clean_phone("(415) 555-0100"), "+14155550100");
    }

    #[test]
    fn metadata_fields_pass_through_unchanged() {
        let mut row = row_with("title", "  Hello   World  ");
        row.insert("_source_url", json!("https://example.com"));
        let (cleaned, stats) = clean_rows(vec![row]);
        assert_eq!(stats.processed, 1);
        assert_eq!(cleaned[0].get("title").unwrap(), "Hello World");
        assert_eq!(cleaned[0].get("_source_url").unwrap(), "https://example.com");
    }

    #[test]
    fn nested_entity_encoding_still_decodes_to_a_fixed_point() {
        let once = clean_text("&amp;nbsp;caf&amp;amp;eacute;");
        assert_eq!(clean_text(&once), once);
    }

    proptest::proptest! {
        // clean(clean(x)) = clean(x): every cleaner is a projection onto its
        // own fixed points. Restricted to text without entity-like runs
        // ("&", ";") since those are covered separately above — arbitrarily
        // deep nesting is a decode concern, not a whitespace/case one.
        #[test]
        fn clean_text_is_idempotent(s in "[-a-zA-Z0-9 .,!?$%()]{0,64}") {
            let once = clean_text(&s);
            proptest::prop_assert_eq!(clean_text(&once), once);
        }

        #[test]
        fn clean_price_is_idempotent(s in "[$0-9.,]{0,24}") {
            let once = clean_price(&s);
            proptest::prop_assert_eq!(clean_price(&once), once);
        }

        #[test]
        fn clean_url_is_idempotent(s in "[-a-zA-Z0-9./:]{0,64}") {
            let once = clean_url(&s);
            proptest::prop_assert_eq!(clean_url(&once), once);
        }

        #[test]
        fn clean_phone_is_idempotent(s in "[-+() 0-9]{0,20}") {
            let once = clean_phone(&s);
            proptest::prop_assert_eq!(clean_phone(&once), once);
        }
    }
}
