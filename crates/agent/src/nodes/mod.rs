//! Graph nodes and wiring.
//!
//! One file per decision step. The graph re-enters at `understand` on every
//! user turn:
//!
//! ```text
//! understand ──┬─ no domain config ─────────────▶ enrich ─▶ synthesize ─▶ END
//!              ├─ no questions yet ─▶ generate_questions ─▶ END
//!              └─ otherwise ────────▶ analyze_gaps
//!                                        ├─ ready ─▶ enrich ─▶ synthesize ─▶ END
//!                                        ├─ next question ─▶ ask ─▶ END
//!                                        └─ otherwise ─▶ END
//! ```
//!
//! Activity creation runs outside the graph, after the user confirms.

use std::sync::Arc;

use planmind_graph::{Graph, Next, Role, SessionState};

use crate::Core;

mod ask;
mod enrich;
mod gaps;
mod questions;
mod synthesize;
mod understand;

pub(crate) use ask::AskQuestionNode;
pub(crate) use enrich::EnrichNode;
pub(crate) use gaps::AnalyzeGapsNode;
pub(crate) use questions::GenerateQuestionsNode;
pub(crate) use synthesize::SynthesizeNode;
pub(crate) use understand::UnderstandNode;

pub(crate) const UNDERSTAND: &str = "understand";
pub(crate) const GENERATE_QUESTIONS: &str = "generate_questions";
pub(crate) const ANALYZE_GAPS: &str = "analyze_gaps";
pub(crate) const ASK_QUESTION: &str = "ask_question";
pub(crate) const ENRICH: &str = "enrich_data";
pub(crate) const SYNTHESIZE: &str = "synthesize_plan";

pub(crate) fn build_graph(core: Arc<Core>) -> Graph<SessionState> {
    let mut graph = Graph::new(UNDERSTAND);

    graph.add_node(Box::new(UnderstandNode::new(Arc::clone(&core))), |state: &SessionState| {
        if state.domain.is_none() {
            Next::Continue(ENRICH)
        } else if state.all_questions.is_empty() {
            Next::Continue(GENERATE_QUESTIONS)
        } else {
            Next::Continue(ANALYZE_GAPS)
        }
    });

    graph.add_node(Box::new(GenerateQuestionsNode::new(Arc::clone(&core))), |_| Next::End);

    graph.add_node(Box::new(AnalyzeGapsNode::new(Arc::clone(&core))), |state: &SessionState| {
        if state.ready_to_generate {
            Next::Continue(ENRICH)
        } else if state.next_question.is_some() {
            Next::Continue(ASK_QUESTION)
        } else {
            Next::End
        }
    });

    graph.add_node(Box::new(AskQuestionNode::new(Arc::clone(&core))), |_| Next::End);
    graph.add_node(Box::new(EnrichNode::new(Arc::clone(&core))), |_| Next::Continue(SYNTHESIZE));
    graph.add_node(Box::new(SynthesizeNode::new(core)), |_| Next::End);

    graph
}

/// The latest user message, if any.
pub(crate) fn latest_user_message(state: &SessionState) -> Option<&str> {
    state
        .conversation
        .iter()
        .rev()
        .find(|turn| turn.role == Role::User)
        .map(|turn| turn.content.as_str())
}

/// Render the last `max_turns` conversation entries for a prompt.
pub(crate) fn transcript(state: &SessionState, max_turns: usize) -> String {
    let start = state.conversation.len().saturating_sub(max_turns);
    state.conversation[start..]
        .iter()
        .map(|turn| {
            let speaker = match turn.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
                Role::System => "System",
            };
            format!("{speaker}: {}", turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use planmind_graph::ChatTurn;
    use planmind_domains::PlanMode;

    #[test]
    fn transcript_keeps_the_most_recent_turns() {
        let mut state = SessionState::new("u1", PlanMode::Smart);
        for i in 0..5 {
            state.conversation.push(ChatTurn::user(format!("m{i}")));
        }
        let rendered = transcript(&state, 2);
        assert_eq!(rendered, "User: m3\nUser: m4");
    }

    #[test]
    fn latest_user_message_skips_assistant_turns() {
        let mut state = SessionState::new("u1", PlanMode::Smart);
        state.conversation.push(ChatTurn::user("first"));
        state.conversation.push(ChatTurn::assistant("reply"));
        assert_eq!(latest_user_message(&state), Some("first"));
    }
}
