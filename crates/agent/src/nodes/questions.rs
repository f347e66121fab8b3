//! First-turn question loading and the opening greeting.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use planmind_domains::{PlanMode, Question, completeness::question_answered};
use planmind_graph::{Node, Phase, Progress, SessionState, StateUpdate};

use crate::Core;

pub(crate) struct GenerateQuestionsNode {
    core: Arc<Core>,
}

impl GenerateQuestionsNode {
    pub(crate) fn new(core: Arc<Core>) -> Self {
        Self { core }
    }
}

#[async_trait]
impl Node<SessionState> for GenerateQuestionsNode {
    fn name(&self) -> &'static str {
        crate::nodes::GENERATE_QUESTIONS
    }

    async fn run(&self, state: &SessionState) -> Result<StateUpdate> {
        let domain = state.domain.clone().unwrap_or_else(|| "general".to_string());
        let config = self.core.registry.get(&domain);

        let limit = match state.plan_mode {
            PlanMode::Quick => self.core.config.planning.max_quick_questions,
            PlanMode::Smart => self.core.config.planning.max_smart_questions,
        };
        let questions: Vec<Question> =
            config.questions_for(state.plan_mode).iter().take(limit).cloned().collect();

        // The understand pass may already have filled slots from a
        // comprehensive first message; count those as answered from the start
        // and greet with what is actually still open.
        let answered =
            questions.iter().filter(|q| question_answered(&state.slots, q)).count();
        let progress = Progress::of(answered, questions.len());

        let open: Vec<&Question> =
            questions.iter().filter(|q| !question_answered(&state.slots, q)).collect();

        let topic = domain.replace('_', " ");
        let mut reply = format!("Let's put together your {topic} plan.");
        if open.is_empty() {
            reply.push_str(" You've given me everything I need — say the word and I'll draft it.");
        } else {
            reply.push_str(" A few details will help:\n");
            for question in open.iter().take(3) {
                reply.push_str(&format!("- {}\n", question.question));
            }
            let remaining = open.len().saturating_sub(3);
            if remaining > 0 {
                reply.push_str(&format!("…plus {remaining} more after that."));
            }
        }

        Ok(StateUpdate {
            all_questions: Some(questions),
            progress: Some(progress),
            phase: Some(Phase::Gathering),
            reply: Some(reply),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_core;
    use planmind_graph::ChatTurn;
    use serde_json::json;

    #[tokio::test]
    async fn loads_question_set_and_greets_with_open_questions() {
        let node = GenerateQuestionsNode::new(test_core());
        let mut state = SessionState::new("u1", PlanMode::Smart);
        state.domain = Some("travel".to_string());
        state.conversation.push(ChatTurn::user("help me plan a trip"));

        let update = node.run(&state).await.unwrap();
        let questions = update.all_questions.unwrap();
        assert_eq!(questions.len(), 5);
        assert_eq!(update.progress.unwrap(), Progress::of(0, 5));

        let reply = update.reply.unwrap();
        assert!(reply.contains("Where are you headed?"));
        assert!(reply.contains("plus"), "two of five questions are beyond the listed three");
    }

    #[tokio::test]
    async fn pre_filled_slots_are_not_listed_and_count_toward_progress() {
        let node = GenerateQuestionsNode::new(test_core());
        let mut state = SessionState::new("u1", PlanMode::Smart);
        state.domain = Some("travel".to_string());
        state.slots = json!({ "destination": "Dallas", "timing": { "date": "the 10th to the 12th" } })
            .as_object()
            .cloned()
            .unwrap();

        let update = node.run(&state).await.unwrap();
        assert_eq!(update.progress.unwrap(), Progress::of(2, 5));
        let reply = update.reply.unwrap();
        assert!(!reply.contains("Where are you headed?"), "answered question re-asked: {reply}");
        assert!(!reply.contains("What dates"), "answered question re-asked: {reply}");
    }

    #[tokio::test]
    async fn quick_mode_loads_at_most_three_questions() {
        let node = GenerateQuestionsNode::new(test_core());
        let mut state = SessionState::new("u1", PlanMode::Quick);
        state.domain = Some("fitness".to_string());

        let update = node.run(&state).await.unwrap();
        assert!(update.all_questions.unwrap().len() <= 3);
    }
}
