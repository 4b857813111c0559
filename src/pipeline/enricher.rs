//! Appends derived fields: per-domain extraction for URL-shaped values,
//! numeric price shadow fields, text statistics, a content-age indicator,
//! and the row's content hash.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};

use super::row::{Row, META_EXTRACTED_AT};
use super::ProcessingStats;

const TEXT_STATS_MIN_LEN: usize = 20;

pub fn enrich_rows(rows: Vec<Row>) -> (Vec<Row>, ProcessingStats) {
    let start = Instant::now();
    let mut stats = ProcessingStats { total: rows.len(), ..ProcessingStats::default() };
    let mut enriched = Vec::with_capacity(rows.len());

    for row in rows {
        let original = row.clone();
        let row = enrich_row(row);
        stats.processed += 1;
        if row != original {
            stats.modifications += 1;
        }
        enriched.push(row);
    }

    stats.time = start.elapsed();
    (enriched, stats)
}

fn enrich_row(mut row: Row) -> Row {
    let now = now_unix_secs();

    if row.get("_enriched_at").is_none() {
        row.insert("_enriched_at", json!(now));
    }

    let field_count = row.content_fields().count();
    row.insert("_field_count", json!(field_count));

    let derived: Vec<(String, Value)> = row
        .content_fields()
        .filter_map(|(key, value)| {
            let text = value.as_str()?;
            let key_lower = key.to_lowercase();
            if key_lower.contains("url") || key_lower.contains("link") || text.starts_with("http") {
                domain_of(text).map(|domain| (format!("{key}_domain"), json!(domain)))
            } else {
                None
            }
        })
        .collect();
    for (key, value) in derived {
        row.insert(key, value);
    }

    let price_fields: Vec<(String, f64)> = row
        .content_fields()
        .filter_map(|(key, value)| {
            if !key.to_lowercase().contains("price") {
                return None;
            }
            let text = value.as_str()?;
            numeric_price(text).map(|n| (format!("{key}_numeric"), n))
        })
        .collect();
    for (key, value) in price_fields {
        row.insert(key, json!(value));
    }

    let mut total_chars = 0usize;
    let mut total_words = 0usize;
    let mut has_text_field = false;
    for (_, value) in row.content_fields() {
        if let Value::String(text) = value {
            if text.len() > TEXT_STATS_MIN_LEN {
                has_text_field = true;
                total_chars += text.len();
                total_words += text.split_whitespace().count();
            }
        }
    }
    if has_text_field {
        row.insert("_total_text_length", json!(total_chars));
        row.insert("_total_word_count", json!(total_words));
    }

    let extracted_at = row.get(META_EXTRACTED_AT).and_then(Value::as_f64).unwrap_or(now);
    let age_hours = ((now - extracted_at) / 3600.0 * 100.0).round() / 100.0;
    row.insert("_data_age_hours", json!(age_hours));

    row.insert("_content_hash", json!(row.content_hash()));
    row
}

fn now_unix_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn domain_of(value: &str) -> Option<String> {
    let url = if value.starts_with("http://") || value.starts_with("https://") {
        value.to_string()
    } else {
        format!("https://{value}")
    };
    url::Url::parse(&url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
}

fn numeric_price(value: &str) -> Option<f64> {
    let cleaned: String = value.chars().filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',').collect();
    cleaned.replace(',', "").parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row_with(pairs: &[(&str, Value)]) -> Row {
        let mut row = Row::new();
        for (k, v) in pairs {
            row.insert(*k, v.clone());
        }
        row
    }

    #[test]
    fn adds_domain_for_url_field() {
        let row = row_with(&[("product_url", json!("https://shop.example.com/item/42"))]);
        let enriched = enrich_row(row);
        assert_eq!(enriched.get("product_url_domain").unwrap(), "shop.example.com");
    }

    #[test]
    fn adds_numeric_shadow_for_price_field() {
        let row = row_with(&[("price", json!("19.99"))]);
        let enriched = enrich_row(row);
        assert_eq!(enriched.get("price_numeric").unwrap(), &json!(19.99));
    }

    #[test]
    fn content_hash_is_present_and_stable_across_runs() {
        let row = row_with(&[("title", json!("Widget"))]);
        let first = enrich_row(row.clone()).get("_content_hash").unwrap().clone();
        let second = enrich_row(row).get("_content_hash").unwrap().clone();
        assert_eq!(first, second);
    }

    #[test]
    fn short_text_fields_do_not_get_text_stats() {
        let row = row_with(&[("title", json!("Widget"))]);
        let enriched = enrich_row(row);
        assert!(enriched.get("_total_text_length").is_none());
    }

    #[test]
    fn long_text_field_gets_text_stats() {
        let long_text = "a ".repeat(30);
        let row = row_with(&[("description", json!(long_text))]);
        let enriched = enrich_row(row);
        assert!(enriched.get("_total_word_count").is_some());
    }
}
