//! Session state and its reducers.
//!
//! The session exclusively owns its slot map and progress; nodes never
//! mutate state directly. They return a [`StateUpdate`] and the reducers in
//! [`SessionState::apply`] decide what sticks:
//!
//! - conversation, answered questions: append
//! - asked question ids: set union (grows only)
//! - slots: shallow merge, one level deep for composite values, with
//!   "unknown"-style sentinels filtered out
//! - progress: monotonic; a regressing percentage is rejected and logged
//! - phase: forward-only
//! - everything else: replace when present

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use planmind_domains::{PlanMode, Question, SlotMap, is_filled};

// ── Conversation ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One entry in the ordered conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), timestamp: Utc::now() }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into(), timestamp: Utc::now() }
    }
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into(), timestamp: Utc::now() }
    }
}

/// Record of a question the user has answered, with the raw answer text and
/// the value extraction produced for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnsweredQuestion {
    pub question_id: String,
    pub answer: String,
    pub extracted_value: Value,
}

// ── Progress and phase ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub answered: usize,
    pub total: usize,
    pub percentage: u8,
}

impl Progress {
    pub fn of(answered: usize, total: usize) -> Self {
        let percentage =
            if total == 0 { 0 } else { ((answered as f64 / total as f64) * 100.0).round() as u8 };
        Self { answered, total, percentage }
    }
}

/// Conversation phases, in order. The reducer refuses to move backwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    ContextRecognition,
    Gathering,
    Enrichment,
    Synthesis,
    Completed,
}

impl Phase {
    fn rank(self) -> u8 {
        match self {
            Phase::ContextRecognition => 0,
            Phase::Gathering => 1,
            Phase::Enrichment => 2,
            Phase::Synthesis => 3,
            Phase::Completed => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::ContextRecognition => "context_recognition",
            Phase::Gathering => "gathering",
            Phase::Enrichment => "enrichment",
            Phase::Synthesis => "synthesis",
            Phase::Completed => "completed",
        }
    }
}

// ── Plan shape ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    High,
    Medium,
    Low,
}

impl TaskPriority {
    pub fn marker(self) -> &'static str {
        match self {
            TaskPriority::High => "[high]",
            TaskPriority::Medium => "[medium]",
            TaskPriority::Low => "[low]",
        }
    }
}

/// A single actionable step inside the final plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanTask {
    pub title: String,
    pub description: String,
    pub priority: TaskPriority,
    pub estimated_time: String,
    pub category: String,
}

/// The synthesised plan: a short header plus 3–7 ordered tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub title: String,
    pub description: String,
    pub tasks: Vec<PlanTask>,
}

/// Composite record returned once the plan has been stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedActivity {
    pub activity_id: String,
    pub task_ids: Vec<String>,
    /// Digest of the plan this activity was created from.
    pub plan_fingerprint: String,
}

// ── Session state ────────────────────────────────────────────────────────────

/// Everything the planner knows about one user's planning thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub user_id: String,
    pub plan_mode: PlanMode,
    pub conversation: Vec<ChatTurn>,
    pub slots: SlotMap,
    pub asked_question_ids: BTreeSet<String>,
    pub answered_questions: Vec<AnsweredQuestion>,
    pub progress: Progress,
    pub phase: Phase,
    pub domain: Option<String>,
    pub domain_confidence: f64,
    pub all_questions: Vec<Question>,
    pub next_question: Option<Question>,
    pub ready_to_generate: bool,
    pub enriched_data: Option<Value>,
    pub final_plan: Option<Plan>,
    pub created_activity: Option<CreatedActivity>,
    pub awaiting_confirmation: bool,
    pub plan_confirmed: bool,
    /// Completed user turns, used for the first-turn guardrail.
    pub turn_count: u32,
    /// The assistant message produced this turn. Reset at turn start.
    pub reply: Option<String>,
}

impl SessionState {
    pub fn new(user_id: impl Into<String>, plan_mode: PlanMode) -> Self {
        Self {
            user_id: user_id.into(),
            plan_mode,
            conversation: Vec::new(),
            slots: SlotMap::new(),
            asked_question_ids: BTreeSet::new(),
            answered_questions: Vec::new(),
            progress: Progress::default(),
            phase: Phase::default(),
            domain: None,
            domain_confidence: 0.0,
            all_questions: Vec::new(),
            next_question: None,
            ready_to_generate: false,
            enriched_data: None,
            final_plan: None,
            created_activity: None,
            awaiting_confirmation: false,
            plan_confirmed: false,
            turn_count: 0,
            reply: None,
        }
    }

    /// Controller-level transition for a rejected plan: back to gathering
    /// with every slot, asked id, and progress value preserved. This is the
    /// one sanctioned backward phase move, and it never goes through the
    /// reducer.
    pub fn reopen_for_changes(&mut self) {
        self.phase = Phase::Gathering;
        self.awaiting_confirmation = false;
        self.plan_confirmed = false;
        self.ready_to_generate = false;
        self.final_plan = None;
        self.next_question = None;
    }

    /// Apply a node's partial update through the channel reducers.
    pub fn apply(&mut self, update: StateUpdate) {
        self.conversation.extend(update.messages);
        self.asked_question_ids.extend(update.asked_question_ids);
        self.answered_questions.extend(update.answered_questions);
        merge_slots(&mut self.slots, update.slots);

        if let Some(progress) = update.progress {
            if progress.percentage >= self.progress.percentage {
                self.progress = progress;
            } else {
                warn!(
                    prior = self.progress.percentage,
                    incoming = progress.percentage,
                    "rejecting progress regression"
                );
            }
        }

        if let Some(phase) = update.phase {
            if phase.rank() >= self.phase.rank() {
                self.phase = phase;
            } else {
                warn!(prior = self.phase.as_str(), incoming = phase.as_str(), "rejecting backward phase move");
            }
        }

        if let Some(domain) = update.domain {
            self.domain = Some(domain);
        }
        if let Some(confidence) = update.domain_confidence {
            self.domain_confidence = confidence;
        }
        if let Some(questions) = update.all_questions {
            self.all_questions = questions;
        }
        if let Some(next) = update.next_question {
            self.next_question = next;
        }
        if let Some(ready) = update.ready_to_generate {
            self.ready_to_generate = ready;
        }
        if let Some(enriched) = update.enriched_data {
            self.enriched_data = Some(enriched);
        }
        if let Some(plan) = update.final_plan {
            self.final_plan = Some(plan);
        }
        if let Some(activity) = update.created_activity {
            self.created_activity = Some(activity);
        }
        if let Some(awaiting) = update.awaiting_confirmation {
            self.awaiting_confirmation = awaiting;
        }
        if let Some(confirmed) = update.plan_confirmed {
            self.plan_confirmed = confirmed;
        }
        if let Some(reply) = update.reply {
            self.reply = Some(reply);
        }
    }
}

/// Partial state returned by a node. Unset fields leave the channel alone;
/// `next_question` uses a nested Option so a node can explicitly clear it.
#[derive(Debug, Default)]
pub struct StateUpdate {
    pub messages: Vec<ChatTurn>,
    pub asked_question_ids: BTreeSet<String>,
    pub answered_questions: Vec<AnsweredQuestion>,
    pub slots: SlotMap,
    pub progress: Option<Progress>,
    pub phase: Option<Phase>,
    pub domain: Option<String>,
    pub domain_confidence: Option<f64>,
    pub all_questions: Option<Vec<Question>>,
    pub next_question: Option<Option<Question>>,
    pub ready_to_generate: Option<bool>,
    pub enriched_data: Option<Value>,
    pub final_plan: Option<Plan>,
    pub created_activity: Option<CreatedActivity>,
    pub awaiting_confirmation: Option<bool>,
    pub plan_confirmed: Option<bool>,
    pub reply: Option<String>,
}

/// Shallow merge with one level of depth for composite values. Values that
/// read as "unanswered" (empty, "unknown", "TBD") never overwrite anything.
fn merge_slots(current: &mut SlotMap, incoming: SlotMap) {
    for (key, value) in incoming {
        if !is_filled(Some(&value)) {
            continue;
        }
        match (current.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(new)) => {
                for (sub_key, sub_value) in new {
                    if is_filled(Some(&sub_value)) {
                        existing.insert(sub_key, sub_value);
                    }
                }
            }
            (_, value) => {
                current.insert(key, value);
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
