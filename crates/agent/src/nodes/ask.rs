//! Ask the selected question, with the duplicate-prevention guard.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use planmind_domains::evaluate_completeness;
use planmind_graph::{Node, SessionState, StateUpdate};

use crate::Core;

pub(crate) struct AskQuestionNode {
    core: Arc<Core>,
}

impl AskQuestionNode {
    pub(crate) fn new(core: Arc<Core>) -> Self {
        Self { core }
    }
}

#[async_trait]
impl Node<SessionState> for AskQuestionNode {
    fn name(&self) -> &'static str {
        crate::nodes::ASK_QUESTION
    }

    async fn run(&self, state: &SessionState) -> Result<StateUpdate> {
        let Some(question) = &state.next_question else {
            // Nothing left to ask. Report readiness the completeness engine
            // can stand behind.
            let domain = state.domain.clone().unwrap_or_else(|| "general".to_string());
            let report = evaluate_completeness(
                &self.core.registry,
                &state.slots,
                &domain,
                state.plan_mode,
                self.core.config.planning.smart_early_stop_threshold,
            );
            return Ok(StateUpdate {
                reply: Some(
                    "I have everything I need — say the word and I'll draft your plan."
                        .to_string(),
                ),
                ready_to_generate: Some(report.is_ready && state.turn_count >= 1),
                ..Default::default()
            });
        };

        if state.asked_question_ids.contains(&question.id) {
            // Guard: never re-ask. Deflect and clear the selection.
            warn!(question = %question.id, "duplicate question selected; deflecting");
            return Ok(StateUpdate {
                reply: Some(
                    "Got it — I won't ask that again. Anything else you'd like to add?"
                        .to_string(),
                ),
                next_question: Some(None),
                ..Default::default()
            });
        }

        let intro = if state.progress.answered > 0 { "Thanks! " } else { "" };
        let suffix = if state.progress.total > 0 {
            format!(" ({} of {} answered)", state.progress.answered, state.progress.total)
        } else {
            String::new()
        };

        Ok(StateUpdate {
            reply: Some(format!("{intro}{}{suffix}", question.question)),
            asked_question_ids: BTreeSet::from([question.id.clone()]),
            ..Default::default()
        })
    }
}
