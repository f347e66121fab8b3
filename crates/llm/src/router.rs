//! Task-typed provider routing with single-shot fallback and cost accounting.
//!
//! Every planner operation carries a [`TaskType`]; the router maps it to a
//! `{primary, fallback, reason}` strategy, tries the primary once, the
//! fallback once, and surfaces [`LlmError::AllProvidersFailed`] when both
//! fail. Per-call cost is computed from the provider's advertised rates and
//! accumulated in a process-wide ledger.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use crate::providers::{ClaudeProvider, DeepSeekProvider, LlmProvider, OpenAiProvider};
use crate::{
    ChatMessage, CompletionOptions, CompletionResponse, FunctionDef, LlmError, StructuredOptions,
    StructuredResponse, Usage,
};

// ── Task types ───────────────────────────────────────────────────────────────

/// Closed set of planner operations that reach an LLM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    DomainDetection,
    QuestionGeneration,
    GapAnalysis,
    SlotExtraction,
    Enrichment,
    PlanSynthesis,
    General,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::DomainDetection => "domain_detection",
            TaskType::QuestionGeneration => "question_generation",
            TaskType::GapAnalysis => "gap_analysis",
            TaskType::SlotExtraction => "slot_extraction",
            TaskType::Enrichment => "enrichment",
            TaskType::PlanSynthesis => "plan_synthesis",
            TaskType::General => "general",
        }
    }

    pub const ALL: [TaskType; 7] = [
        TaskType::DomainDetection,
        TaskType::QuestionGeneration,
        TaskType::GapAnalysis,
        TaskType::SlotExtraction,
        TaskType::Enrichment,
        TaskType::PlanSynthesis,
        TaskType::General,
    ];
}

/// Provider selection for one task type.
#[derive(Debug, Clone)]
pub struct TaskStrategy {
    pub primary: String,
    pub fallback: String,
    pub reason: &'static str,
}

// ── Cost ledger ──────────────────────────────────────────────────────────────

/// Process-wide token/cost counters. Lock-free so concurrent sessions can
/// record without contention.
#[derive(Debug, Default)]
struct CostLedger {
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
    cost_micro_usd: AtomicU64,
}

impl CostLedger {
    fn record(&self, provider: &dyn LlmProvider, usage: Option<Usage>) {
        let Some(usage) = usage else { return };
        self.prompt_tokens.fetch_add(usage.prompt_tokens, Ordering::Relaxed);
        self.completion_tokens.fetch_add(usage.completion_tokens, Ordering::Relaxed);

        let cost = usage.prompt_tokens as f64 / 1_000_000.0 * provider.input_cost_per_mtok()
            + usage.completion_tokens as f64 / 1_000_000.0 * provider.output_cost_per_mtok();
        self.cost_micro_usd.fetch_add((cost * 1_000_000.0) as u64, Ordering::Relaxed);

        debug!(
            provider = provider.name(),
            model = provider.model(),
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            cost_usd = format!("{cost:.6}"),
            "llm call cost"
        );
    }
}

/// Snapshot of the ledger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostSummary {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_usd: f64,
}

// ── Router ───────────────────────────────────────────────────────────────────

/// Completion result tagged with the provider that actually produced it.
#[derive(Debug, Clone)]
pub struct RoutedCompletion {
    pub provider: String,
    pub response: CompletionResponse,
}

/// Structured result tagged with the provider that actually produced it.
#[derive(Debug, Clone)]
pub struct RoutedStructured {
    pub provider: String,
    pub response: StructuredResponse,
}

/// Model names used when building the stock provider set.
#[derive(Debug, Clone)]
pub struct ProviderModels {
    pub openai: String,
    pub claude: String,
    pub deepseek: String,
}

pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    strategies: HashMap<TaskType, TaskStrategy>,
    ledger: CostLedger,
}

impl ProviderRouter {
    /// Build the stock router: three hosted providers with credentials read
    /// from the environment, and the default strategy table.
    pub fn from_env(models: &ProviderModels, timeout: Duration) -> Self {
        let mut router = Self::empty();
        router.register(Arc::new(OpenAiProvider::new(models.openai.clone(), timeout)));
        router.register(Arc::new(ClaudeProvider::new(models.claude.clone(), timeout)));
        router.register(Arc::new(DeepSeekProvider::new(models.deepseek.clone(), timeout)));
        router.install_default_strategies();
        router
    }

    /// A router with no providers or strategies. Used by tests and embedders
    /// that supply their own provider set.
    pub fn empty() -> Self {
        Self {
            providers: HashMap::new(),
            strategies: HashMap::new(),
            ledger: CostLedger::default(),
        }
    }

    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn set_strategy(
        &mut self,
        task: TaskType,
        primary: impl Into<String>,
        fallback: impl Into<String>,
        reason: &'static str,
    ) {
        self.strategies.insert(
            task,
            TaskStrategy { primary: primary.into(), fallback: fallback.into(), reason },
        );
    }

    pub fn install_default_strategies(&mut self) {
        self.set_strategy(
            TaskType::DomainDetection,
            "openai",
            "deepseek",
            "classification wants a fast, cheap model",
        );
        self.set_strategy(
            TaskType::SlotExtraction,
            "openai",
            "claude",
            "extraction needs reliable forced function calls",
        );
        self.set_strategy(
            TaskType::QuestionGeneration,
            "openai",
            "deepseek",
            "templated text on a cheap model",
        );
        self.set_strategy(
            TaskType::GapAnalysis,
            "deepseek",
            "openai",
            "bookkeeping is mostly local; cheap when the LLM is consulted",
        );
        self.set_strategy(
            TaskType::Enrichment,
            "openai",
            "claude",
            "web-tool calls behave best here",
        );
        self.set_strategy(
            TaskType::PlanSynthesis,
            "claude",
            "openai",
            "strongest long-form structured output",
        );
        self.set_strategy(TaskType::General, "openai", "claude", "balanced default");
    }

    /// Override the `general` strategy's primary with a named provider, per
    /// the `preferred_model` configuration option.
    pub fn prefer_for_general(&mut self, provider_name: &str) {
        if !self.providers.contains_key(provider_name) {
            warn!(provider = provider_name, "preferred provider is not registered, ignoring");
            return;
        }
        let fallback = self
            .strategies
            .get(&TaskType::General)
            .map(|s| s.fallback.clone())
            .unwrap_or_else(|| "openai".to_string());
        self.set_strategy(TaskType::General, provider_name, fallback, "configured preference");
    }

    pub fn strategy(&self, task: TaskType) -> Option<&TaskStrategy> {
        self.strategies.get(&task)
    }

    /// Names of registered providers that currently hold credentials.
    pub fn available_providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .providers
            .values()
            .filter(|p| p.is_available())
            .map(|p| p.name().to_string())
            .collect();
        names.sort();
        names
    }

    pub fn cost_summary(&self) -> CostSummary {
        CostSummary {
            prompt_tokens: self.ledger.prompt_tokens.load(Ordering::Relaxed),
            completion_tokens: self.ledger.completion_tokens.load(Ordering::Relaxed),
            cost_usd: self.ledger.cost_micro_usd.load(Ordering::Relaxed) as f64 / 1_000_000.0,
        }
    }

    fn provider(&self, name: &str) -> Result<Arc<dyn LlmProvider>, LlmError> {
        let provider = self
            .providers
            .get(name)
            .ok_or_else(|| LlmError::UnknownRoute(name.to_string()))?;
        if !provider.is_available() {
            return Err(LlmError::ProviderUnavailable {
                provider: name.to_string(),
                reason: "credentials missing".to_string(),
            });
        }
        Ok(Arc::clone(provider))
    }

    fn route(&self, task: TaskType) -> Result<TaskStrategy, LlmError> {
        self.strategies
            .get(&task)
            .cloned()
            .ok_or_else(|| LlmError::UnknownRoute(task.as_str().to_string()))
    }

    /// Plain completion with fallback.
    pub async fn complete(
        &self,
        task: TaskType,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<RoutedCompletion, LlmError> {
        let strategy = self.route(task)?;

        match self.try_complete(&strategy.primary, messages, options).await {
            Ok(routed) => Ok(routed),
            Err(primary_err) => {
                warn!(
                    task = task.as_str(),
                    primary = %strategy.primary,
                    fallback = %strategy.fallback,
                    error = %primary_err,
                    "primary provider failed, trying fallback"
                );
                self.try_complete(&strategy.fallback, messages, options)
                    .await
                    .map_err(|fallback_err| {
                        warn!(task = task.as_str(), error = %fallback_err, "fallback provider failed");
                        LlmError::AllProvidersFailed {
                            task: task.as_str(),
                            primary: strategy.primary.clone(),
                            fallback: strategy.fallback.clone(),
                        }
                    })
            }
        }
    }

    /// Structured (forced function call) completion with fallback.
    pub async fn structured(
        &self,
        task: TaskType,
        messages: &[ChatMessage],
        functions: &[FunctionDef],
        options: &StructuredOptions,
    ) -> Result<RoutedStructured, LlmError> {
        let strategy = self.route(task)?;

        match self.try_structured(&strategy.primary, messages, functions, options).await {
            Ok(routed) => Ok(routed),
            Err(primary_err) => {
                warn!(
                    task = task.as_str(),
                    primary = %strategy.primary,
                    fallback = %strategy.fallback,
                    error = %primary_err,
                    "primary provider failed, trying fallback"
                );
                self.try_structured(&strategy.fallback, messages, functions, options)
                    .await
                    .map_err(|fallback_err| {
                        warn!(task = task.as_str(), error = %fallback_err, "fallback provider failed");
                        LlmError::AllProvidersFailed {
                            task: task.as_str(),
                            primary: strategy.primary.clone(),
                            fallback: strategy.fallback.clone(),
                        }
                    })
            }
        }
    }

    async fn try_complete(
        &self,
        name: &str,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<RoutedCompletion, LlmError> {
        let provider = self.provider(name)?;
        let response = provider.generate_completion(messages, options).await?;
        self.ledger.record(provider.as_ref(), response.usage);
        Ok(RoutedCompletion { provider: provider.name().to_string(), response })
    }

    async fn try_structured(
        &self,
        name: &str,
        messages: &[ChatMessage],
        functions: &[FunctionDef],
        options: &StructuredOptions,
    ) -> Result<RoutedStructured, LlmError> {
        let provider = self.provider(name)?;
        let response = provider.generate_structured(messages, functions, options).await?;
        self.ledger.record(provider.as_ref(), response.usage);
        Ok(RoutedStructured { provider: provider.name().to_string(), response })
    }
}

impl std::fmt::Debug for ProviderRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRouter")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("strategies", &self.strategies.len())
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Provider that succeeds or fails on demand.
    struct FakeProvider {
        name: &'static str,
        available: bool,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeProvider {
        fn new(name: &'static str, available: bool, fail: bool) -> Arc<Self> {
            Arc::new(Self { name, available, fail, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl LlmProvider for FakeProvider {
        fn name(&self) -> &str {
            self.name
        }
        fn model(&self) -> &str {
            "fake-model"
        }
        fn input_cost_per_mtok(&self) -> f64 {
            1.0
        }
        fn output_cost_per_mtok(&self) -> f64 {
            2.0
        }
        fn is_available(&self) -> bool {
            self.available
        }

        async fn generate_completion(
            &self,
            _messages: &[ChatMessage],
            _options: &CompletionOptions,
        ) -> Result<CompletionResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                return Err(LlmError::Api {
                    provider: self.name.to_string(),
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            Ok(CompletionResponse {
                content: format!("reply from {}", self.name),
                usage: Some(Usage { prompt_tokens: 1_000_000, completion_tokens: 500_000 }),
            })
        }

        async fn generate_structured(
            &self,
            _messages: &[ChatMessage],
            _functions: &[FunctionDef],
            _options: &StructuredOptions,
        ) -> Result<StructuredResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                return Err(LlmError::Api {
                    provider: self.name.to_string(),
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            Ok(StructuredResponse {
                content: String::new(),
                function_call: Some(crate::FunctionCall {
                    name: "f".to_string(),
                    arguments_json: "{}".to_string(),
                }),
                usage: None,
            })
        }
    }

    fn router_with(primary: Arc<FakeProvider>, fallback: Arc<FakeProvider>) -> ProviderRouter {
        let mut router = ProviderRouter::empty();
        router.register(primary);
        router.register(fallback);
        router.set_strategy(TaskType::General, "alpha", "beta", "test");
        router
    }

    #[tokio::test]
    async fn primary_success_skips_fallback() {
        let alpha = FakeProvider::new("alpha", true, false);
        let beta = FakeProvider::new("beta", true, false);
        let router = router_with(Arc::clone(&alpha), Arc::clone(&beta));

        let out = router
            .complete(TaskType::General, &[ChatMessage::user("hi")], &CompletionOptions::default())
            .await
            .unwrap();
        assert_eq!(out.provider, "alpha");
        assert_eq!(beta.calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn primary_failure_falls_back_once() {
        let alpha = FakeProvider::new("alpha", true, true);
        let beta = FakeProvider::new("beta", true, false);
        let router = router_with(Arc::clone(&alpha), Arc::clone(&beta));

        let out = router
            .complete(TaskType::General, &[ChatMessage::user("hi")], &CompletionOptions::default())
            .await
            .unwrap();
        assert_eq!(out.provider, "beta");
        assert_eq!(alpha.calls.load(Ordering::Relaxed), 1);
        assert_eq!(beta.calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn unavailable_primary_routes_to_fallback_without_calling_it() {
        let alpha = FakeProvider::new("alpha", false, false);
        let beta = FakeProvider::new("beta", true, false);
        let router = router_with(Arc::clone(&alpha), Arc::clone(&beta));

        let out = router
            .complete(TaskType::General, &[ChatMessage::user("hi")], &CompletionOptions::default())
            .await
            .unwrap();
        assert_eq!(out.provider, "beta");
        assert_eq!(alpha.calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn both_failing_is_all_providers_failed() {
        let alpha = FakeProvider::new("alpha", true, true);
        let beta = FakeProvider::new("beta", true, true);
        let router = router_with(alpha, beta);

        let err = router
            .structured(
                TaskType::General,
                &[ChatMessage::user("hi")],
                &[],
                &StructuredOptions::default(),
            )
            .await
            .unwrap_err();
        match err {
            LlmError::AllProvidersFailed { task, primary, fallback } => {
                assert_eq!(task, "general");
                assert_eq!(primary, "alpha");
                assert_eq!(fallback, "beta");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn ledger_accumulates_cost_from_advertised_rates() {
        let alpha = FakeProvider::new("alpha", true, false);
        let beta = FakeProvider::new("beta", true, false);
        let router = router_with(alpha, beta);

        router
            .complete(TaskType::General, &[ChatMessage::user("hi")], &CompletionOptions::default())
            .await
            .unwrap();

        let summary = router.cost_summary();
        assert_eq!(summary.prompt_tokens, 1_000_000);
        assert_eq!(summary.completion_tokens, 500_000);
        // 1 Mtok in at $1 + 0.5 Mtok out at $2.
        assert!((summary.cost_usd - 2.0).abs() < 1e-6);
    }

    #[test]
    fn default_strategies_cover_every_task_type() {
        let mut router = ProviderRouter::empty();
        router.install_default_strategies();
        for task in TaskType::ALL {
            assert!(router.strategy(task).is_some(), "missing strategy for {task:?}");
        }
    }

    #[test]
    fn prefer_for_general_requires_registered_provider() {
        let mut router = ProviderRouter::empty();
        router.install_default_strategies();
        router.prefer_for_general("claude");
        // Not registered, so the table is unchanged.
        assert_eq!(router.strategy(TaskType::General).unwrap().primary, "openai");

        router.register(FakeProvider::new("claude", true, false));
        router.prefer_for_general("claude");
        assert_eq!(router.strategy(TaskType::General).unwrap().primary, "claude");
    }
}
