//! planmind-agent: the conversational planning orchestrator.
//!
//! Each user turn re-enters a checkpointed state graph that detects the
//! planning domain, extracts slots from the whole conversation, tracks which
//! questions remain, asks the next one or enriches and synthesises a plan,
//! and finally, after an explicit confirmation, hands the plan to the
//! storage collaborator as an activity with ordered tasks.
//!
//! ```no_run
//! use planmind_agent::{Planner, PlannerConfig, TurnRequest};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let planner = Planner::new(PlannerConfig::default())?;
//! let response = planner
//!     .run_turn(TurnRequest::new("42", "help me plan a trip to Dallas next weekend"))
//!     .await?;
//! println!("{}", response.message);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

mod activity;
mod confirm;
mod error;
mod keyword_extract;
mod nodes;

pub mod enrichment;
pub mod storage;
pub mod telemetry;

pub use error::PlannerError;
pub use planmind_config::PlannerConfig;
pub use planmind_domains::{DomainRegistry, PlanMode};
pub use planmind_graph::{
    ChatTurn, CreatedActivity, Phase, Plan, PlanTask, Progress, Role, SessionState, TaskPriority,
};
pub use planmind_llm::{CostSummary, ProviderModels, ProviderRouter};
pub use storage::{InMemoryStorage, PlannerStorage};

use confirm::ConfirmIntent;
use enrichment::EnrichmentCache;
use planmind_graph::{Checkpointer, Graph, MemoryCheckpointer, TurnGate};

/// Shared services every node sees.
pub(crate) struct Core {
    pub(crate) config: PlannerConfig,
    pub(crate) registry: DomainRegistry,
    pub(crate) router: ProviderRouter,
    pub(crate) cache: EnrichmentCache,
}

#[cfg(test)]
pub(crate) fn test_core() -> Arc<Core> {
    let mut router = ProviderRouter::empty();
    router.install_default_strategies();
    Arc::new(Core {
        config: PlannerConfig::default(),
        registry: DomainRegistry::builtin(),
        router,
        cache: EnrichmentCache::new(3600),
    })
}

// ── Turn I/O ─────────────────────────────────────────────────────────────────

/// One message of caller-supplied history, seeding a fresh session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
}

/// Input for one planning turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub user_id: String,
    pub user_message: String,
    pub user_profile: Option<serde_json::Value>,
    pub conversation_history: Option<Vec<HistoryMessage>>,
    /// Overrides the configured default for new sessions only.
    pub plan_mode: Option<PlanMode>,
}

impl TurnRequest {
    pub fn new(user_id: impl Into<String>, user_message: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_message: user_message.into(),
            user_profile: None,
            conversation_history: None,
            plan_mode: None,
        }
    }

    pub fn with_mode(mut self, mode: PlanMode) -> Self {
        self.plan_mode = Some(mode);
        self
    }
}

/// Output of one planning turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResponse {
    pub message: String,
    pub phase: Phase,
    pub progress: Option<Progress>,
    pub ready_to_generate: bool,
    pub final_plan: Option<Plan>,
    pub created_activity: Option<CreatedActivity>,
    pub domain: Option<String>,
}

/// Streaming variant events: progress milestones, then a terminal
/// `Complete` carrying the full response.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Progress { phase: String, message: String },
    Complete(TurnResponse),
}

// ── Planner ──────────────────────────────────────────────────────────────────

/// The planning engine. One instance serves many users; sessions are
/// isolated by thread id and serialised per user.
pub struct Planner {
    core: Arc<Core>,
    graph: Graph<SessionState>,
    checkpoints: MemoryCheckpointer<SessionState>,
    gate: TurnGate,
    storage: Option<Arc<dyn PlannerStorage>>,
}

impl Planner {
    /// Build the stock planner: hosted providers from the environment, the
    /// built-in domain catalog, in-memory checkpoints.
    pub fn new(config: PlannerConfig) -> Result<Self, PlannerError> {
        let timeout = Duration::from_secs(config.llm.request_timeout_seconds);
        let models = ProviderModels {
            openai: config.llm.openai_model.clone(),
            claude: config.llm.claude_model.clone(),
            deepseek: config.llm.deepseek_model.clone(),
        };
        let mut router = ProviderRouter::from_env(&models, timeout);
        if let Some(preferred) = config.preferred_provider() {
            router.prefer_for_general(preferred);
        }
        Self::with_router(config, router)
    }

    /// Build with a caller-supplied router (custom or mock providers).
    pub fn with_router(config: PlannerConfig, router: ProviderRouter) -> Result<Self, PlannerError> {
        if !config.planning.use_graph_engine {
            return Err(PlannerError::LegacyEngineUnavailable);
        }
        let cache = EnrichmentCache::new(config.enrichment.ttl_seconds);
        let core = Arc::new(Core { registry: DomainRegistry::builtin(), router, cache, config });
        let graph = nodes::build_graph(Arc::clone(&core));
        Ok(Self {
            core,
            graph,
            checkpoints: MemoryCheckpointer::new(),
            gate: TurnGate::new(),
            storage: None,
        })
    }

    /// Attach the storage collaborator used for activity creation and
    /// session snapshots.
    pub fn with_storage(mut self, storage: Arc<dyn PlannerStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Token and dollar totals across every provider call so far.
    pub fn cost_summary(&self) -> CostSummary {
        self.core.router.cost_summary()
    }

    /// Run one planning turn for a user. Turns for the same user are FIFO;
    /// an overlapping turn is rejected with [`PlannerError::Busy`].
    #[instrument(skip(self, request), fields(user = %request.user_id))]
    pub async fn run_turn(&self, request: TurnRequest) -> Result<TurnResponse, PlannerError> {
        let thread_id = thread_id(&request.user_id);
        let _permit = self
            .gate
            .acquire(&thread_id)
            .map_err(|_| PlannerError::Busy(request.user_id.clone()))?;

        let mut state = self.load_or_create(&request);
        state.reply = None;

        // Confirmation gate: once a plan is on the table (or already saved),
        // this turn is interpreted before the graph sees anything.
        let gate_intent = if state.final_plan.is_some()
            && (state.awaiting_confirmation || state.created_activity.is_some())
        {
            Some(confirm::classify(&request.user_message))
        } else {
            None
        };

        state.conversation.push(ChatTurn::user(request.user_message.clone()));

        let mut state = match gate_intent {
            Some(ConfirmIntent::Affirm) => self.confirm_plan(state).await,
            Some(ConfirmIntent::Decline) => {
                // Back to gathering with everything preserved; the change
                // request itself is in the history for the next extraction.
                state.reopen_for_changes();
                state.reply = Some("No problem — what should I change?".to_string());
                state
            }
            Some(ConfirmIntent::Revise) => {
                state.reopen_for_changes();
                self.graph.run(&self.checkpoints, &thread_id, state).await?
            }
            None => self.graph.run(&self.checkpoints, &thread_id, state).await?,
        };

        let message = state
            .reply
            .clone()
            .unwrap_or_else(|| "Noted — tell me more whenever you're ready.".to_string());
        state.conversation.push(ChatTurn::assistant(message.clone()));
        state.turn_count += 1;
        self.checkpoints.save(&thread_id, &state);
        self.persist_session(&state).await;

        debug!(phase = state.phase.as_str(), progress = state.progress.percentage, "turn complete");

        Ok(TurnResponse {
            message,
            phase: state.phase,
            progress: if state.progress.total > 0 { Some(state.progress) } else { None },
            ready_to_generate: state.ready_to_generate,
            final_plan: state.final_plan.clone(),
            created_activity: state.created_activity.clone(),
            domain: state.domain.clone(),
        })
    }

    /// Streaming variant: progress events while the turn runs, then a
    /// terminal [`ProgressEvent::Complete`] with the same response
    /// `run_turn` would return.
    pub async fn run_turn_streaming(
        &self,
        request: TurnRequest,
        events: mpsc::Sender<ProgressEvent>,
    ) -> Result<(), PlannerError> {
        let _ = events
            .send(ProgressEvent::Progress {
                phase: Phase::ContextRecognition.as_str().to_string(),
                message: "Reading your message…".to_string(),
            })
            .await;

        let response = self.run_turn(request).await?;

        let _ = events
            .send(ProgressEvent::Progress {
                phase: response.phase.as_str().to_string(),
                message: match response.phase {
                    Phase::Completed => "Plan ready.".to_string(),
                    _ => "Gathering details.".to_string(),
                },
            })
            .await;
        let _ = events.send(ProgressEvent::Complete(response)).await;
        Ok(())
    }

    /// The latest checkpointed state for a user, mainly for inspection and
    /// tests.
    pub fn session(&self, user_id: &str) -> Option<SessionState> {
        self.checkpoints.load(&thread_id(user_id))
    }

    fn load_or_create(&self, request: &TurnRequest) -> SessionState {
        if let Some(state) = self.checkpoints.load(&thread_id(&request.user_id)) {
            return state;
        }

        let mode = request
            .plan_mode
            .unwrap_or_else(|| PlanMode::parse(&self.core.config.planning.default_plan_mode));
        let mut state = SessionState::new(request.user_id.clone(), mode);

        if let Some(profile) = &request.user_profile {
            state.conversation.push(ChatTurn::system(format!("User profile: {profile}")));
        }
        if let Some(history) = &request.conversation_history {
            for message in history {
                let turn = match message.role.as_str() {
                    "assistant" => ChatTurn::assistant(message.content.clone()),
                    "system" => ChatTurn::system(message.content.clone()),
                    _ => ChatTurn::user(message.content.clone()),
                };
                state.conversation.push(turn);
            }
        }
        state
    }

    /// Handle an affirmed plan: create the activity exactly once and keep
    /// the plan around if creation fails so the user can retry.
    async fn confirm_plan(&self, mut state: SessionState) -> SessionState {
        if let Some(existing) = &state.created_activity {
            state.reply = Some(format!(
                "That plan is already saved ({} tasks) — you're all set.",
                existing.task_ids.len()
            ));
            return state;
        }
        let Some(plan) = state.final_plan.clone() else {
            return state;
        };
        let Some(storage) = &self.storage else {
            warn!("plan confirmed but no storage collaborator is configured");
            state.reply = Some(
                "I couldn't save the plan just now — it's still here, try confirming again in a \
                 moment."
                    .to_string(),
            );
            return state;
        };

        match activity::create_activity(storage.as_ref(), &state, &plan).await {
            Ok(created) => {
                let count = created.task_ids.len();
                state.created_activity = Some(created);
                state.plan_confirmed = true;
                state.awaiting_confirmation = false;
                state.phase = Phase::Completed;
                state.reply =
                    Some(format!("Done — \"{}\" is saved with {count} tasks. Good luck!", plan.title));
            }
            Err(err) => {
                warn!(%err, "activity creation failed; keeping the plan for a retry");
                state.reply = Some(
                    "I couldn't save the plan just now — it's still here, try confirming again \
                     in a moment."
                        .to_string(),
                );
            }
        }
        state
    }

    async fn persist_session(&self, state: &SessionState) {
        let Some(storage) = &self.storage else { return };
        let Ok(snapshot) = serde_json::to_value(state) else { return };

        let result = match storage.get_active_session(&state.user_id).await {
            Ok(Some(session)) => {
                storage.update_session(&session.id, snapshot, &state.user_id).await
            }
            Ok(None) => storage.create_session(&state.user_id, snapshot).await.map(|_| ()),
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            // Snapshots are a mirror of the checkpoint, never the source of
            // truth; failures only cost observability.
            warn!(%err, "session snapshot persistence failed");
        }
    }
}

impl std::fmt::Debug for Planner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Planner")
            .field("graph", &self.graph)
            .field("has_storage", &self.storage.is_some())
            .finish()
    }
}

fn thread_id(user_id: &str) -> String {
    format!("user_{user_id}")
}

// ── Tests ────────────────────────────────────────────────────────────────────
