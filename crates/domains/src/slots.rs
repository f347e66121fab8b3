//! Slot-map helpers shared by the condition evaluator and the completeness
//! engine.
//!
//! A slot map is a `serde_json` object keyed by question id or dotted path;
//! composite answers nest one or more levels (`timing.date`). A slot is
//! *filled* iff its value is present, non-empty, and not a sentinel meaning
//! "unknown".

use serde_json::Value;

pub type SlotMap = serde_json::Map<String, Value>;

/// Sentinels treated as "not answered" regardless of where they came from.
const UNFILLED_SENTINELS: [&str; 4] = ["unknown", "tbd", "n/a", "not sure"];

/// Look up `path` in the slot map.
///
/// Tries the literal key first (slot maps may be flat with dotted keys),
/// then descends segment by segment through nested objects.
pub fn slot_lookup<'a>(slots: &'a SlotMap, path: &str) -> Option<&'a Value> {
    if let Some(value) = slots.get(path) {
        return Some(value);
    }

    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = slots.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Whether a slot value counts as answered.
pub fn is_filled(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            !trimmed.is_empty()
                && !UNFILLED_SENTINELS.iter().any(|sentinel| trimmed.eq_ignore_ascii_case(sentinel))
        }
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => map.values().any(|v| is_filled(Some(v))),
        Some(Value::Bool(_)) | Some(Value::Number(_)) => true,
    }
}

/// String form of a slot value for comparisons and template substitution.
pub fn slot_as_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn slots(value: Value) -> SlotMap {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn lookup_prefers_literal_dotted_keys() {
        let map = slots(json!({ "timing.date": "Friday", "timing": { "date": "Saturday" } }));
        assert_eq!(slot_lookup(&map, "timing.date").unwrap(), "Friday");
    }

    #[test]
    fn lookup_descends_nested_objects() {
        let map = slots(json!({ "timing": { "date": "Friday", "time": "5pm" } }));
        assert_eq!(slot_lookup(&map, "timing.time").unwrap(), "5pm");
        assert!(slot_lookup(&map, "timing.zone").is_none());
        assert!(slot_lookup(&map, "budget").is_none());
    }

    #[test]
    fn sentinels_and_empties_are_unfilled() {
        assert!(!is_filled(None));
        assert!(!is_filled(Some(&json!(null))));
        assert!(!is_filled(Some(&json!(""))));
        assert!(!is_filled(Some(&json!("  "))));
        assert!(!is_filled(Some(&json!("unknown"))));
        assert!(!is_filled(Some(&json!("TBD"))));
        assert!(!is_filled(Some(&json!([]))));
    }

    #[test]
    fn explicit_answers_are_filled() {
        assert!(is_filled(Some(&json!("Dallas"))));
        // "flexible" is an explicit user statement, unlike the sentinels.
        assert!(is_filled(Some(&json!("flexible"))));
        assert!(is_filled(Some(&json!("none"))));
        assert!(is_filled(Some(&json!(30))));
        assert!(is_filled(Some(&json!({ "date": "Friday" }))));
        assert!(!is_filled(Some(&json!({ "date": "" }))));
    }
}
