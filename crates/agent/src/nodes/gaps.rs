//! Gap analysis: progress accounting and next-question selection.
//!
//! Pure bookkeeping, no LLM. Readiness defers to the completeness engine
//! so `ready_to_generate == true` always implies the engine agrees.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use planmind_domains::{
    completeness::question_answered, evaluate_completeness, slot_as_string, slot_lookup,
};
use planmind_graph::{AnsweredQuestion, Node, Phase, Progress, SessionState, StateUpdate};

use crate::Core;

pub(crate) struct AnalyzeGapsNode {
    core: Arc<Core>,
}

impl AnalyzeGapsNode {
    pub(crate) fn new(core: Arc<Core>) -> Self {
        Self { core }
    }
}

#[async_trait]
impl Node<SessionState> for AnalyzeGapsNode {
    fn name(&self) -> &'static str {
        crate::nodes::ANALYZE_GAPS
    }

    async fn run(&self, state: &SessionState) -> Result<StateUpdate> {
        let domain = state.domain.clone().unwrap_or_else(|| "general".to_string());

        let answered =
            state.all_questions.iter().filter(|q| question_answered(&state.slots, q)).count();
        let progress = Progress::of(answered, state.all_questions.len());

        // Record questions that became answered since the last turn.
        let mut newly_answered = Vec::new();
        for question in &state.all_questions {
            if !question_answered(&state.slots, question) {
                continue;
            }
            if state.answered_questions.iter().any(|a| a.question_id == question.id) {
                continue;
            }
            let value = slot_lookup(&state.slots, &question.slot_path)
                .or_else(|| slot_lookup(&state.slots, &question.id))
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            newly_answered.push(AnsweredQuestion {
                question_id: question.id.clone(),
                answer: slot_as_string(&value),
                extracted_value: value,
            });
        }

        // Highest-priority open question not yet asked, in list order.
        let next_question = state
            .all_questions
            .iter()
            .find(|q| {
                !question_answered(&state.slots, q) && !state.asked_question_ids.contains(&q.id)
            })
            .cloned();

        let report = evaluate_completeness(
            &self.core.registry,
            &state.slots,
            &domain,
            state.plan_mode,
            self.core.config.planning.smart_early_stop_threshold,
        );
        // First-turn guardrail: a plan is never generated before the user has
        // seen at least one reply, no matter how complete the message was.
        let ready = report.is_ready && state.turn_count >= 1;

        debug!(
            answered,
            total = state.all_questions.len(),
            ready,
            next = next_question.as_ref().map(|q| q.id.as_str()),
            "gap analysis"
        );

        Ok(StateUpdate {
            progress: Some(progress),
            answered_questions: newly_answered,
            next_question: Some(next_question),
            ready_to_generate: Some(ready),
            phase: if ready { Some(Phase::Enrichment) } else { None },
            ..Default::default()
        })
    }
}
