//! Domain knowledge registry.
//!
//! Per-domain question tables and enrichment rules, a tiny parser for rule
//! conditions, and the pure slot-completeness engine. Everything here is
//! plain data and LLM-free; the registry is built once at startup and
//! read-only afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub mod catalog;
pub mod completeness;
pub mod condition;
pub mod slots;

pub use completeness::{CompletenessReport, evaluate_completeness};
pub use condition::{Condition, ConditionError};
pub use slots::{SlotMap, is_filled, slot_as_string, slot_lookup};

// ── Core data types ──────────────────────────────────────────────────────────

/// Plan mode controls the question set and whether enrichment runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanMode {
    Quick,
    #[default]
    Smart,
}

impl PlanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanMode::Quick => "quick",
            PlanMode::Smart => "smart",
        }
    }

    /// Lenient parse; anything that isn't quick is smart.
    pub fn parse(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("quick") { PlanMode::Quick } else { PlanMode::Smart }
    }
}

/// One question the planner may ask. The id is the canonical slot key,
/// stable within its domain and mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub question: String,
    pub required: bool,
    /// Dotted path into the slot map where the answer lands.
    pub slot_path: String,
}

/// A rule describing what real-world context to fetch before synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentRule {
    /// Closed-grammar condition over the slot map; see [`condition`].
    pub condition: String,
    /// Search-query templates with `{slot.path}` placeholders.
    pub web_searches: Vec<String>,
    /// Slot paths that feed the enrichment cache key, in addition to the
    /// standard (destination, dates, budget) trio.
    #[serde(default)]
    pub cache_fields: Vec<String>,
}

/// Question sets keyed by plan mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSets {
    pub quick_plan: Vec<Question>,
    pub smart_plan: Vec<Question>,
}

/// Static configuration for one planning domain. Immutable at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    pub id: String,
    pub questions: QuestionSets,
    #[serde(default)]
    pub enrichment_rules: Vec<EnrichmentRule>,
}

impl DomainConfig {
    pub fn questions_for(&self, mode: PlanMode) -> &[Question] {
        match mode {
            PlanMode::Quick => &self.questions.quick_plan,
            PlanMode::Smart => &self.questions.smart_plan,
        }
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// The closed set of domain labels the classifier may produce.
pub const KNOWN_DOMAINS: [&str; 7] = [
    "daily_planning",
    "travel",
    "interview_prep",
    "event_planning",
    "fitness",
    "learning",
    "general",
];

/// Process-wide lookup from domain id to configuration. Built once during
/// initialisation, read-only thereafter.
#[derive(Debug, Clone)]
pub struct DomainRegistry {
    domains: HashMap<String, Arc<DomainConfig>>,
}

impl DomainRegistry {
    /// Registry holding the built-in catalog for every known domain.
    pub fn builtin() -> Self {
        let mut registry = Self { domains: HashMap::new() };
        for config in catalog::builtin_domains() {
            registry.insert(config);
        }
        registry
    }

    pub fn insert(&mut self, config: DomainConfig) {
        self.domains.insert(config.id.clone(), Arc::new(config));
    }

    /// Load domain entries from the JSON registry format and merge them over
    /// the current contents (same id replaces).
    pub fn load_json(&mut self, raw: &str) -> Result<usize, serde_json::Error> {
        let entries: Vec<DomainConfig> = serde_json::from_str(raw)?;
        let count = entries.len();
        for entry in entries {
            debug!(domain = %entry.id, "registering domain from JSON");
            self.insert(entry);
        }
        Ok(count)
    }

    /// Fetch a domain by any label the conversation produced; aliases are
    /// normalised and unknown labels fall back to `general`.
    pub fn get(&self, label: &str) -> Arc<DomainConfig> {
        let id = normalize_domain(label);
        self.domains
            .get(&id)
            .or_else(|| self.domains.get("general"))
            .cloned()
            .unwrap_or_else(|| {
                // Only reachable with a hand-built registry missing `general`.
                Arc::new(DomainConfig {
                    id: "general".to_string(),
                    questions: QuestionSets { quick_plan: vec![], smart_plan: vec![] },
                    enrichment_rules: vec![],
                })
            })
    }

    pub fn contains(&self, label: &str) -> bool {
        self.domains.contains_key(&normalize_domain(label))
    }

    pub fn domain_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.domains.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Map free-form domain labels onto the closed set.
///
/// The classifier and older clients use a handful of aliases ("interview
/// prep", "plan my day", "date night"); everything unrecognised becomes
/// `general`.
pub fn normalize_domain(label: &str) -> String {
    let canonical = label.trim().to_lowercase().replace([' ', '-'], "_");
    let id = match canonical.as_str() {
        "interview_prep" | "interview" | "job_interview" => "interview_prep",
        "daily_planning" | "daily_routine" | "plan_my_day" | "daily" => "daily_planning",
        "travel" | "trip" | "vacation" => "travel",
        "event_planning" | "event" | "party" | "date_night" | "date" => "event_planning",
        "fitness" | "workout" | "exercise" => "fitness",
        "learning" | "study" | "studying" => "learning",
        "general" => "general",
        _ => "general",
    };
    id.to_string()
}

// ── Tests ────────────────────────────────────────────────────────────────────
