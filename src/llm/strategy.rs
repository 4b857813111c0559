//! Extraction and validation of the strategy JSON schema from a raw model
//! response, which may wrap the JSON in prose or markdown fences.

use crate::error::LlmError;

use super::types::{Strategy, REQUIRED_STRATEGY_KEYS};

/// Locates the outermost `{ ... }` span in `text` and returns it, or the
/// whole trimmed text if no braces are found (lets `serde_json` produce the
/// actual parse error in that case).
fn extract_json_span(text: &str) -> &str {
    let start = text.find('{');
    let end = text.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if e > s => &text[s..=e],
        _ => text.trim(),
    }
}

/// Parses and validates a raw backend response into a [`Strategy`].
///
/// Failures here are soft: the caller decides whether to treat them as a
/// backend failure (tripping the circuit breaker) or just fall through to
/// the next backend — a malformed strategy is not the same as a network
/// failure.
pub fn parse_strategy(raw: &str) -> Result<Strategy, LlmError> {
    let json_span = extract_json_span(raw);
    let value: serde_json::Value = serde_json::from_str(json_span)
        .map_err(|e| LlmError::InvalidStrategyJson(format!("{e}: {json_span}")))?;

    let obj = value
        .as_object()
        .ok_or_else(|| LlmError::InvalidStrategyJson("top-level value is not an object".into()))?;

    for key in REQUIRED_STRATEGY_KEYS {
        if !obj.contains_key(*key) {
            return Err(LlmError::MissingStrategyField((*key).to_string()));
        }
    }

    serde_json::from_value(value).map_err(|e| LlmError::InvalidStrategyJson(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_strategy_wrapped_in_prose() {
        let raw = r#"Sure, here's the plan:
        {"actions": [{"type": "wait", "milliseconds": 500}], "confidence": 0.9}
        Let me know if you need anything else."#;
        let strategy = parse_strategy(raw).unwrap();
        assert_eq!(strategy.actions.len(), 1);
        assert!((strategy.confidence - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn rejects_missing_required_field() {
        let raw = r#"{"actions": []}"#;
        let err = parse_strategy(raw).unwrap_err();
        assert!(matches!(err, LlmError::MissingStrategyField(f) if f == "confidence"));
    }

    #[test]
    fn rejects_non_json() {
        let err = parse_strategy("not json at all").unwrap_err();
        assert!(matches!(err, LlmError::InvalidStrategyJson(_)));
    }

    #[test]
    fn pagination_kind_defaults_to_none_when_omitted() {
        let raw = r#"{
            "actions": [],
            "confidence": 0.5,
            "pagination": {"next_page_selector": null, "max_pages": 1}
        }"#;
        let strategy = parse_strategy(raw).unwrap();
        let pagination = strategy.pagination.unwrap();
        assert_eq!(pagination.kind, super::super::types::PaginationKind::None);
    }

    #[test]
    fn pagination_kind_is_parsed_when_present() {
        let raw = r#"{
            "actions": [],
            "confidence": 0.5,
            "pagination": {"kind": "infinite-scroll", "next_page_selector": null, "max_pages": 5}
        }"#;
        let strategy = parse_strategy(raw).unwrap();
        let pagination = strategy.pagination.unwrap();
        assert_eq!(pagination.kind, super::super::types::PaginationKind::InfiniteScroll);
    }

    use super::super::types::{PaginationKind, PaginationStrategy, StrategyAction};

    fn arb_action() -> impl proptest::strategy::Strategy<Value = StrategyAction> {
        use proptest::prelude::*;
        prop_oneof![
            "[a-z.#-]{1,12}".prop_map(|selector| StrategyAction::Click { selector }),
            (1u64..5000).prop_map(|milliseconds| StrategyAction::Wait { milliseconds }),
            (-500i64..500).prop_map(|pixels| StrategyAction::Scroll { pixels }),
            ("[a-z]{1,8}", "[a-z.#-]{1,12}")
                .prop_map(|(name, selector)| StrategyAction::ExtractField { name, selector }),
        ]
    }

    proptest::proptest! {
        // parse(extract_json(serialize(strategy))) = strategy for every
        // strategy our own types can represent. Confidence is quantized to
        // two decimal digits so the f64 round trip through serde_json can't
        // perturb the f32 bit pattern.
        #[test]
        fn strategy_round_trips_through_serialization(
            actions in proptest::collection::vec(arb_action(), 0..4),
            confidence_hundredths in 0i32..=100,
            has_pagination in proptest::bool::ANY,
            max_pages in 1u32..20,
        ) {
            let strategy = Strategy {
                actions,
                pagination: has_pagination.then(|| PaginationStrategy {
                    kind: PaginationKind::Numbered,
                    next_page_selector: Some("a.next".to_string()),
                    max_pages,
                }),
                confidence: confidence_hundredths as f32 / 100.0,
                rationale: None,
            };

            let serialized = serde_json::to_string(&strategy).unwrap();
            let wrapped = format!("Here's the plan:\n{serialized}\nEnd of plan.");
            let parsed = parse_strategy(&wrapped).unwrap();
            proptest::prop_assert_eq!(parsed, strategy);
        }
    }
}
