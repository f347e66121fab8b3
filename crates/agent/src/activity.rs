//! Activity creation. Runs outside the graph, after the user confirms.

use sha2::{Digest, Sha256};
use tracing::info;

use planmind_graph::{CreatedActivity, Plan, SessionState};

use crate::error::PlannerError;
use crate::storage::{NewActivity, NewTask, PlannerStorage};

/// Stable digest of a plan's content, recorded on the created activity so a
/// storage layer can deduplicate retried confirmations.
pub(crate) fn plan_fingerprint(plan: &Plan) -> String {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(plan).unwrap_or_default());
    let digest = hasher.finalize();
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Create the activity, then its tasks in order, linking each with its
/// sequence index. Callers guard idempotency via `state.created_activity`.
pub(crate) async fn create_activity(
    storage: &dyn PlannerStorage,
    state: &SessionState,
    plan: &Plan,
) -> Result<CreatedActivity, PlannerError> {
    let category = state.domain.clone().unwrap_or_else(|| "general".to_string());

    let activity = storage
        .create_activity(NewActivity {
            title: plan.title.clone(),
            description: plan.description.clone(),
            category: category.clone(),
            status: "active".to_string(),
            user_id: state.user_id.clone(),
        })
        .await?;

    let mut task_ids = Vec::with_capacity(plan.tasks.len());
    for (order, task) in plan.tasks.iter().enumerate() {
        let record = storage
            .create_task(NewTask {
                title: task.title.clone(),
                description: task.description.clone(),
                category: task.category.clone(),
                priority: format!("{:?}", task.priority).to_lowercase(),
                time_estimate: task.estimated_time.clone(),
                user_id: state.user_id.clone(),
            })
            .await?;
        storage.add_task_to_activity(&activity.id, &record.id, order).await?;
        task_ids.push(record.id);
    }

    info!(activity = %activity.id, tasks = task_ids.len(), "activity created");
    Ok(CreatedActivity {
        activity_id: activity.id,
        task_ids,
        plan_fingerprint: plan_fingerprint(plan),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use planmind_domains::PlanMode;
    use planmind_graph::{PlanTask, TaskPriority};

    fn plan() -> Plan {
        Plan {
            title: "Dallas weekend".to_string(),
            description: "Two days in Dallas".to_string(),
            tasks: (0..3)
                .map(|i| PlanTask {
                    title: format!("task {i}"),
                    description: "d".to_string(),
                    priority: TaskPriority::Medium,
                    estimated_time: "1 hour".to_string(),
                    category: "travel".to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn fingerprints_are_stable_and_content_sensitive() {
        let a = plan();
        let mut b = plan();
        assert_eq!(plan_fingerprint(&a), plan_fingerprint(&b));
        b.title = "Austin weekend".to_string();
        assert_ne!(plan_fingerprint(&a), plan_fingerprint(&b));
    }

    #[tokio::test]
    async fn creates_activity_and_ordered_tasks() {
        let storage = InMemoryStorage::new();
        let mut state = SessionState::new("u1", PlanMode::Smart);
        state.domain = Some("travel".to_string());
        let plan = plan();

        let created = create_activity(&storage, &state, &plan).await.unwrap();
        assert_eq!(created.task_ids.len(), 3);

        let tasks = storage.get_activity_tasks(&created.activity_id, "u1").await.unwrap();
        let titles: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["task 0", "task 1", "task 2"]);
        assert_eq!(tasks[0].priority, "medium");
    }
}
