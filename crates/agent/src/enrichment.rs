//! Enrichment cache and the web-tool adapter.
//!
//! Enrichment is advisory: a cache miss triggers one web-search request
//! through the provider's tool facility, and any failure degrades to an
//! empty record rather than blocking synthesis.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::debug;

use planmind_domains::{DomainConfig, SlotMap, slot_as_string, slot_lookup};
use planmind_llm::{ChatMessage, CompletionOptions, LlmError, ProviderRouter, TaskType};

// ── Cache ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct CacheEntry {
    data: Value,
    expires_at: DateTime<Utc>,
}

/// Process-wide TTL cache for enrichment records. Entries are deterministic
/// given their key, so last-writer-wins is safe for concurrent writers.
#[derive(Debug)]
pub struct EnrichmentCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl EnrichmentCache {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: Duration::seconds(ttl_seconds as i64),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(key)?;
        if entry.expires_at <= Utc::now() {
            return None;
        }
        Some(entry.data.clone())
    }

    pub fn put(&self, key: &str, data: Value) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                key.to_string(),
                CacheEntry { data, expires_at: Utc::now() + self.ttl },
            );
        }
    }

    #[cfg(test)]
    fn put_with_expiry(&self, key: &str, data: Value, expires_at: DateTime<Utc>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.to_string(), CacheEntry { data, expires_at });
        }
    }
}

/// Slot paths that always feed the cache key when the domain fills them.
const STANDARD_KEY_PATHS: [&str; 3] = ["destination", "timing.date", "budget"];

/// Build the cache key from `(domain, destination, dates, budget)` plus any
/// rule-declared cache fields. Paths the domain never filled are omitted, so
/// a fitness session is not keyed on a destination it does not have.
pub fn cache_key(config: &DomainConfig, slots: &SlotMap) -> String {
    let mut paths: Vec<&str> = STANDARD_KEY_PATHS.to_vec();
    for rule in &config.enrichment_rules {
        for field in &rule.cache_fields {
            if !paths.contains(&field.as_str()) {
                paths.push(field);
            }
        }
    }

    let mut key = config.id.clone();
    for path in paths {
        if let Some(value) = slot_lookup(slots, path) {
            let rendered = slot_as_string(value);
            if !rendered.trim().is_empty() {
                key.push('|');
                key.push_str(path);
                key.push('=');
                key.push_str(rendered.trim().to_lowercase().as_str());
            }
        }
    }
    key
}

/// Substitute `{slot.path}` placeholders in a search template. Templates
/// with an unfilled placeholder return `None` so half-formed queries are
/// never issued.
pub fn render_template(template: &str, slots: &SlotMap) -> Option<String> {
    let mut out = String::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let end = rest[start..].find('}')?;
        out.push_str(&rest[..start]);
        let path = &rest[start + 1..start + end];
        let value = slot_lookup(slots, path)?;
        let rendered = slot_as_string(value);
        if rendered.trim().is_empty() {
            return None;
        }
        out.push_str(rendered.trim());
        rest = &rest[start + end + 1..];
    }
    out.push_str(rest);
    Some(out)
}

/// Collect the search queries whose rule conditions hold for these slots.
/// Unparseable conditions are skipped with a log line; a registry typo must
/// not take enrichment down.
pub fn build_queries(config: &DomainConfig, slots: &SlotMap) -> Vec<String> {
    let mut queries = Vec::new();
    for rule in &config.enrichment_rules {
        let condition = match planmind_domains::Condition::parse(&rule.condition) {
            Ok(condition) => condition,
            Err(err) => {
                debug!(domain = %config.id, condition = %rule.condition, %err, "skipping unparseable rule");
                continue;
            }
        };
        if !condition.evaluate(slots) {
            continue;
        }
        for template in &rule.web_searches {
            if let Some(query) = render_template(template, slots) {
                queries.push(query);
            }
        }
    }
    queries
}

// ── Web-tool adapter ─────────────────────────────────────────────────────────

/// Thin shim over the enrichment provider's web-search facility. Passes a
/// single search-request text and takes whatever comes back: JSON when the
/// model cooperates, free text otherwise.
#[derive(Debug)]
pub struct WebSearchAdapter;

impl WebSearchAdapter {
    pub async fn search(router: &ProviderRouter, request: &str) -> Result<Value, LlmError> {
        let messages = [
            ChatMessage::system(
                "You are a research assistant with web search enabled. Use it to gather \
                 current, concrete information for the request below. Respond with a single \
                 JSON object keyed by topic; keep values short and factual.",
            ),
            ChatMessage::user(request.to_string()),
        ];
        let options = CompletionOptions { temperature: Some(0.2), ..Default::default() };
        let routed = router.complete(TaskType::Enrichment, &messages, &options).await?;

        let content = routed.response.content;
        match planmind_llm::extract_json_output::<Value>(&content) {
            Some(value) => Ok(value),
            None => Ok(Value::String(content)),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use planmind_domains::DomainRegistry;
    use serde_json::json;

    fn slots(value: Value) -> SlotMap {
        value.as_object().cloned().unwrap_or_default()
    }

    fn travel() -> std::sync::Arc<DomainConfig> {
        DomainRegistry::builtin().get("travel")
    }

    #[test]
    fn cache_round_trips_within_ttl() {
        let cache = EnrichmentCache::new(3600);
        assert!(cache.get("k").is_none());
        cache.put("k", json!({ "weather": "hot" }));
        assert_eq!(cache.get("k").unwrap()["weather"], "hot");
    }

    #[test]
    fn expired_entries_read_as_misses() {
        let cache = EnrichmentCache::new(3600);
        cache.put_with_expiry("k", json!({}), Utc::now() - Duration::seconds(1));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn cache_key_omits_unfilled_fields() {
        let config = travel();
        let key_full = cache_key(
            &config,
            &slots(json!({
                "destination": "Dallas",
                "timing": { "date": "June 10-12" },
                "budget": "$500"
            })),
        );
        assert_eq!(key_full, "travel|destination=dallas|timing.date=june 10-12|budget=$500");

        let key_partial = cache_key(&config, &slots(json!({ "destination": "Dallas" })));
        assert_eq!(key_partial, "travel|destination=dallas");
    }

    #[test]
    fn identical_inputs_produce_identical_keys() {
        let config = travel();
        let a = slots(json!({ "destination": "Dallas", "budget": "500" }));
        let b = slots(json!({ "budget": "500", "destination": "Dallas" }));
        assert_eq!(cache_key(&config, &a), cache_key(&config, &b));
    }

    #[test]
    fn template_substitution_fills_nested_paths() {
        let map = slots(json!({ "destination": "Dallas", "timing": { "date": "June 10" } }));
        let query =
            render_template("hotels in {destination} around {timing.date}", &map).unwrap();
        assert_eq!(query, "hotels in Dallas around June 10");
    }

    #[test]
    fn templates_with_missing_slots_are_dropped() {
        let map = slots(json!({ "destination": "Dallas" }));
        assert!(render_template("flights around {timing.date}", &map).is_none());
    }

    #[test]
    fn queries_follow_rule_conditions() {
        let config = travel();
        let map = slots(json!({ "destination": "Dallas", "transportation": "driving" }));
        let queries = build_queries(&config, &map);

        // has_destination rule fires; the dates rule does not; the driving
        // comparison fires.
        assert!(queries.iter().any(|q| q.contains("weather forecast for Dallas")));
        assert!(queries.iter().any(|q| q.contains("road conditions")));
        assert!(!queries.iter().any(|q| q.contains("hotel price")));
    }
}
