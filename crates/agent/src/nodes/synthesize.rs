//! Final plan synthesis.
//!
//! One forced structured call produces the plan draft; validation clamps it
//! into shape (title ≤ 60, description ≤ 150, 3–7 complete tasks) before it
//! is presented for confirmation. The activity is NOT created here; that
//! waits for an explicit yes on the next turn.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use planmind_graph::{Node, Phase, Plan, PlanTask, SessionState, StateUpdate, TaskPriority};
use planmind_llm::{ChatMessage, FunctionDef, StructuredOptions, parse_structured};

use crate::Core;
use crate::nodes::transcript;

const MIN_TASKS: usize = 3;
const MAX_TASKS: usize = 7;
const MAX_TITLE_CHARS: usize = 60;
const MAX_DESCRIPTION_CHARS: usize = 150;

pub(crate) struct SynthesizeNode {
    core: Arc<Core>,
}

impl SynthesizeNode {
    pub(crate) fn new(core: Arc<Core>) -> Self {
        Self { core }
    }

    async fn synthesize(&self, state: &SessionState, domain: &str) -> Result<Plan> {
        let function = FunctionDef {
            name: "create_plan".to_string(),
            description: "Produce the final structured plan".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string", "maxLength": MAX_TITLE_CHARS },
                    "description": { "type": "string", "maxLength": MAX_DESCRIPTION_CHARS },
                    "tasks": {
                        "type": "array",
                        "minItems": MIN_TASKS,
                        "maxItems": MAX_TASKS,
                        "items": {
                            "type": "object",
                            "properties": {
                                "title": { "type": "string" },
                                "description": { "type": "string" },
                                "priority": { "type": "string", "enum": ["high", "medium", "low"] },
                                "estimated_time": { "type": "string" },
                                "category": { "type": "string" }
                            },
                            "required": ["title", "description", "priority", "estimated_time"]
                        }
                    }
                },
                "required": ["title", "description", "tasks"]
            }),
        };

        let enrichment = state
            .enriched_data
            .clone()
            .unwrap_or(serde_json::Value::Null);
        let messages = [
            ChatMessage::system(
                "You are a planning assistant. Turn the gathered details into a concrete, \
                 actionable plan with ordered tasks. Be specific; no filler tasks.",
            ),
            ChatMessage::user(format!(
                "Domain: {domain}\nMode: {}\nGathered details: {}\nResearch context: {}\n\n\
                 Recent conversation:\n{}",
                state.plan_mode.as_str(),
                serde_json::Value::Object(state.slots.clone()),
                enrichment,
                transcript(state, 12),
            )),
        ];

        let options = StructuredOptions {
            function_call: Some("create_plan".to_string()),
            ..Default::default()
        };
        let routed = self
            .core
            .router
            .structured(planmind_llm::TaskType::PlanSynthesis, &messages, &[function], &options)
            .await?;

        let draft: PlanDraft =
            parse_structured(&routed.response).ok_or_else(|| anyhow!("plan did not parse"))?;
        validate_plan(draft, domain)
    }
}

#[async_trait]
impl Node<SessionState> for SynthesizeNode {
    fn name(&self) -> &'static str {
        crate::nodes::SYNTHESIZE
    }

    async fn run(&self, state: &SessionState) -> Result<StateUpdate> {
        let domain = state.domain.clone().unwrap_or_else(|| "general".to_string());

        match self.synthesize(state, &domain).await {
            Ok(plan) => Ok(StateUpdate {
                reply: Some(render_plan(&plan)),
                final_plan: Some(plan),
                phase: Some(Phase::Completed),
                ready_to_generate: Some(true),
                awaiting_confirmation: Some(true),
                ..Default::default()
            }),
            Err(err) => {
                // Phase stays at enrichment; the next turn retries from a
                // warm cache.
                warn!(%err, "plan synthesis failed");
                Ok(StateUpdate {
                    reply: Some(
                        "I hit a snag putting the plan together — give me another nudge and \
                         I'll try again."
                            .to_string(),
                    ),
                    ..Default::default()
                })
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PlanDraft {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tasks: Vec<TaskDraft>,
}

#[derive(Debug, Default, Deserialize)]
struct TaskDraft {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    priority: String,
    #[serde(default, alias = "estimatedTime", alias = "time_estimate")]
    estimated_time: String,
    #[serde(default)]
    category: String,
}

/// Enforce the plan-shape guarantees. Too few usable tasks is a synthesis
/// failure; too many are truncated; a missing category becomes the domain id.
fn validate_plan(draft: PlanDraft, domain: &str) -> Result<Plan> {
    let mut tasks: Vec<PlanTask> = draft
        .tasks
        .into_iter()
        .filter(|task| !task.title.trim().is_empty())
        .map(|task| PlanTask {
            title: task.title.trim().to_string(),
            description: task.description.trim().to_string(),
            priority: parse_priority(&task.priority),
            estimated_time: if task.estimated_time.trim().is_empty() {
                "30 minutes".to_string()
            } else {
                task.estimated_time.trim().to_string()
            },
            category: if task.category.trim().is_empty() {
                domain.to_string()
            } else {
                task.category.trim().to_string()
            },
        })
        .collect();

    if tasks.len() < MIN_TASKS {
        return Err(anyhow!("plan has {} usable tasks, need at least {MIN_TASKS}", tasks.len()));
    }
    tasks.truncate(MAX_TASKS);

    let title = truncate_chars(
        if draft.title.trim().is_empty() { "Your plan" } else { draft.title.trim() },
        MAX_TITLE_CHARS,
    );
    let description = truncate_chars(draft.description.trim(), MAX_DESCRIPTION_CHARS);

    Ok(Plan { title, description, tasks })
}

fn parse_priority(raw: &str) -> TaskPriority {
    match raw.trim().to_lowercase().as_str() {
        "high" => TaskPriority::High,
        "low" => TaskPriority::Low,
        _ => TaskPriority::Medium,
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

/// The user-facing plan message: header, numbered tasks with priority
/// markers and time estimates, and the confirmation prompt.
fn render_plan(plan: &Plan) -> String {
    let mut message = format!("Here's your plan: {}\n{}\n\n", plan.title, plan.description);
    for (index, task) in plan.tasks.iter().enumerate() {
        message.push_str(&format!(
            "{}. {} {} — {} ({})\n",
            index + 1,
            task.priority.marker(),
            task.title,
            task.description,
            task.estimated_time
        ));
    }
    message.push_str("\nReply \"yes\" and I'll create this plan, or tell me what to change.");
    message
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn draft_task(title: &str, category: &str) -> TaskDraft {
        TaskDraft {
            title: title.to_string(),
            description: "do it".to_string(),
            priority: "high".to_string(),
            estimated_time: "1 hour".to_string(),
            category: category.to_string(),
        }
    }

    #[test]
    fn missing_category_defaults_to_domain_id() {
        let draft = PlanDraft {
            title: "Trip".to_string(),
            description: "A trip".to_string(),
            tasks: vec![draft_task("a", ""), draft_task("b", "lodging"), draft_task("c", "")],
        };
        let plan = validate_plan(draft, "travel").unwrap();
        assert_eq!(plan.tasks[0].category, "travel");
        assert_eq!(plan.tasks[1].category, "lodging");
    }

    #[test]
    fn too_few_tasks_is_a_failure() {
        let draft = PlanDraft {
            title: "Trip".to_string(),
            description: String::new(),
            tasks: vec![draft_task("a", ""), draft_task("", "")],
        };
        assert!(validate_plan(draft, "travel").is_err());
    }

    #[test]
    fn excess_tasks_are_truncated_to_seven() {
        let draft = PlanDraft {
            title: "Trip".to_string(),
            description: String::new(),
            tasks: (0..10).map(|i| draft_task(&format!("task {i}"), "")).collect(),
        };
        let plan = validate_plan(draft, "travel").unwrap();
        assert_eq!(plan.tasks.len(), 7);
    }

    #[test]
    fn long_title_and_description_are_clamped() {
        let draft = PlanDraft {
            title: "t".repeat(100),
            description: "d".repeat(300),
            tasks: (0..3).map(|i| draft_task(&format!("task {i}"), "")).collect(),
        };
        let plan = validate_plan(draft, "travel").unwrap();
        assert_eq!(plan.title.chars().count(), 60);
        assert_eq!(plan.description.chars().count(), 150);
    }

    #[test]
    fn unknown_priority_defaults_to_medium() {
        assert_eq!(parse_priority("HIGH"), TaskPriority::High);
        assert_eq!(parse_priority("urgent"), TaskPriority::Medium);
        assert_eq!(parse_priority("low"), TaskPriority::Low);
    }

    #[test]
    fn rendered_message_numbers_tasks_with_markers() {
        let draft = PlanDraft {
            title: "Dallas weekend".to_string(),
            description: "Two days in Dallas".to_string(),
            tasks: (0..3).map(|i| draft_task(&format!("task {i}"), "")).collect(),
        };
        let plan = validate_plan(draft, "travel").unwrap();
        let message = render_plan(&plan);
        assert!(message.contains("1. [high] task 0"));
        assert!(message.contains("(1 hour)"));
        assert!(message.contains("Reply \"yes\""));
    }
}
