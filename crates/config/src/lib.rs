use std::env;
use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningConfig {
    /// Default plan mode for new sessions: "quick" or "smart".
    pub default_plan_mode: String,
    /// Selects the graph-based planning core. The legacy orchestrator is not
    /// shipped; setting this to `false` is rejected at startup.
    pub use_graph_engine: bool,
    pub max_quick_questions: usize,
    pub max_smart_questions: usize,
    /// In smart mode the plan may be generated once this many questions are
    /// answered, provided every required question is among them.
    pub smart_early_stop_threshold: usize,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            default_plan_mode: "smart".to_string(),
            use_graph_engine: true,
            max_quick_questions: 3,
            max_smart_questions: 5,
            smart_early_stop_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainConfigSection {
    /// Per-turn multiplier applied to the incumbent domain's confidence when
    /// the classifier proposes a different domain.
    pub decay_factor: f64,
    /// Margin the challenger must clear above the decayed incumbent score.
    pub switch_margin: f64,
    /// A challenger below this confidence never displaces an established domain.
    pub switch_absolute_floor: f64,
}

impl Default for DomainConfigSection {
    fn default() -> Self {
        Self {
            decay_factor: 0.85,
            switch_margin: 0.06,
            switch_absolute_floor: 0.85,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// How long a cached enrichment record stays fresh.
    pub ttl_seconds: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self { ttl_seconds: 21_600 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name override for the `general` task type ("openai",
    /// "claude", "deepseek"). Empty means use the routing table.
    pub preferred_model: String,
    pub openai_model: String,
    pub claude_model: String,
    pub deepseek_model: String,
    /// Applied to every provider HTTP call.
    pub request_timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            preferred_model: String::new(),
            openai_model: "gpt-4o-mini".to_string(),
            claude_model: "claude-3-5-sonnet-latest".to_string(),
            deepseek_model: "deepseek-chat".to_string(),
            request_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PlannerConfig {
    pub planning: PlanningConfig,
    pub domain: DomainConfigSection,
    pub enrichment: EnrichmentConfig,
    pub llm: LlmConfig,
    pub telemetry: TelemetryConfig,
}

impl PlannerConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }

        if let Ok(value) = env::var("PLANMIND_PREFERRED_MODEL") {
            if !value.is_empty() {
                config.llm.preferred_model = value;
            }
        }

        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    /// Provider override for the `general` task type, if configured.
    pub fn preferred_provider(&self) -> Option<&str> {
        let name = self.llm.preferred_model.trim();
        if name.is_empty() { None } else { Some(name) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_knobs() {
        let config = PlannerConfig::default();
        assert_eq!(config.planning.default_plan_mode, "smart");
        assert!(config.planning.use_graph_engine);
        assert_eq!(config.planning.max_quick_questions, 3);
        assert_eq!(config.planning.max_smart_questions, 5);
        assert_eq!(config.planning.smart_early_stop_threshold, 3);
        assert_eq!(config.enrichment.ttl_seconds, 21_600);
        assert!((config.domain.decay_factor - 0.85).abs() < f64::EPSILON);
        assert!((config.domain.switch_margin - 0.06).abs() < f64::EPSILON);
        assert!((config.domain.switch_absolute_floor - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = PlannerConfig::load_from("does/not/exist.toml").unwrap();
        assert_eq!(config.llm.openai_model, "gpt-4o-mini");
        assert!(config.preferred_provider().is_none());
    }

    #[test]
    fn partial_toml_fills_remaining_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("planner.toml");
        std::fs::write(&path, "[planning]\ndefault_plan_mode = \"quick\"\n").unwrap();

        let config = PlannerConfig::load_from(&path).unwrap();
        assert_eq!(config.planning.default_plan_mode, "quick");
        assert_eq!(config.planning.max_smart_questions, 5);
    }

    #[test]
    fn save_and_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("planner.toml");

        let mut config = PlannerConfig::default();
        config.llm.preferred_model = "claude".to_string();
        config.save_to(&path).unwrap();

        let reloaded = PlannerConfig::load_from(&path).unwrap();
        assert_eq!(reloaded.preferred_provider(), Some("claude"));
    }
}
