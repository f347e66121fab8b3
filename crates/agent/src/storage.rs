//! Storage collaborator interface.
//!
//! The planner emits plans; it does not persist them itself. An embedding
//! service implements [`PlannerStorage`] over its own database; the
//! [`InMemoryStorage`] implementation backs tests and single-process use.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("storage backend error: {0}")]
    Backend(String),
}

// ── Records ──────────────────────────────────────────────────────────────────

/// A user-facing plan header that owns an ordered set of tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub status: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: String,
    pub time_estimate: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewActivity {
    pub title: String,
    pub description: String,
    pub category: String,
    pub status: String,
    pub user_id: String,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: String,
    pub time_estimate: String,
    pub user_id: String,
}

/// Opaque session snapshot mirrored out of the checkpoint store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub user_id: String,
    pub state: Value,
    pub updated_at: DateTime<Utc>,
}

// ── Trait ────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait PlannerStorage: Send + Sync {
    async fn create_activity(&self, activity: NewActivity) -> Result<Activity, StorageError>;
    async fn create_task(&self, task: NewTask) -> Result<TaskRecord, StorageError>;
    async fn add_task_to_activity(
        &self,
        activity_id: &str,
        task_id: &str,
        order: usize,
    ) -> Result<(), StorageError>;
    async fn get_activity_tasks(
        &self,
        activity_id: &str,
        user_id: &str,
    ) -> Result<Vec<TaskRecord>, StorageError>;

    async fn get_active_session(&self, user_id: &str)
    -> Result<Option<SessionRecord>, StorageError>;
    async fn create_session(
        &self,
        user_id: &str,
        state: Value,
    ) -> Result<SessionRecord, StorageError>;
    async fn update_session(
        &self,
        session_id: &str,
        state: Value,
        user_id: &str,
    ) -> Result<(), StorageError>;
    async fn get_session(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Option<SessionRecord>, StorageError>;
}

// ── In-memory implementation ─────────────────────────────────────────────────

#[derive(Debug, Default)]
struct StoreInner {
    activities: HashMap<String, Activity>,
    tasks: HashMap<String, TaskRecord>,
    /// activity id → ordered (order, task id) pairs.
    links: HashMap<String, Vec<(usize, String)>>,
    sessions: HashMap<String, SessionRecord>,
}

/// Process-local storage for tests and single-process embedders.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    inner: Mutex<StoreInner>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StoreInner>, StorageError> {
        self.inner.lock().map_err(|_| StorageError::Backend("store poisoned".to_string()))
    }

    pub fn activity_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.activities.len()).unwrap_or(0)
    }
}

#[async_trait]
impl PlannerStorage for InMemoryStorage {
    async fn create_activity(&self, activity: NewActivity) -> Result<Activity, StorageError> {
        let record = Activity {
            id: Uuid::new_v4().to_string(),
            title: activity.title,
            description: activity.description,
            category: activity.category,
            status: activity.status,
            user_id: activity.user_id,
            created_at: Utc::now(),
        };
        self.lock()?.activities.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn create_task(&self, task: NewTask) -> Result<TaskRecord, StorageError> {
        let record = TaskRecord {
            id: Uuid::new_v4().to_string(),
            title: task.title,
            description: task.description,
            category: task.category,
            priority: task.priority,
            time_estimate: task.time_estimate,
            user_id: task.user_id,
            created_at: Utc::now(),
        };
        self.lock()?.tasks.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn add_task_to_activity(
        &self,
        activity_id: &str,
        task_id: &str,
        order: usize,
    ) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        if !inner.activities.contains_key(activity_id) {
            return Err(StorageError::NotFound { kind: "activity", id: activity_id.to_string() });
        }
        if !inner.tasks.contains_key(task_id) {
            return Err(StorageError::NotFound { kind: "task", id: task_id.to_string() });
        }
        let links = inner.links.entry(activity_id.to_string()).or_default();
        links.push((order, task_id.to_string()));
        links.sort_by_key(|(order, _)| *order);
        Ok(())
    }

    async fn get_activity_tasks(
        &self,
        activity_id: &str,
        user_id: &str,
    ) -> Result<Vec<TaskRecord>, StorageError> {
        let inner = self.lock()?;
        let links = inner.links.get(activity_id).cloned().unwrap_or_default();
        Ok(links
            .into_iter()
            .filter_map(|(_, task_id)| inner.tasks.get(&task_id).cloned())
            .filter(|task| task.user_id == user_id)
            .collect())
    }

    async fn get_active_session(
        &self,
        user_id: &str,
    ) -> Result<Option<SessionRecord>, StorageError> {
        let inner = self.lock()?;
        let mut sessions: Vec<&SessionRecord> =
            inner.sessions.values().filter(|s| s.user_id == user_id).collect();
        sessions.sort_by_key(|s| s.updated_at);
        Ok(sessions.last().map(|s| (*s).clone()))
    }

    async fn create_session(
        &self,
        user_id: &str,
        state: Value,
    ) -> Result<SessionRecord, StorageError> {
        let record = SessionRecord {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            state,
            updated_at: Utc::now(),
        };
        self.lock()?.sessions.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn update_session(
        &self,
        session_id: &str,
        state: Value,
        user_id: &str,
    ) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        let session = inner.sessions.get_mut(session_id).ok_or(StorageError::NotFound {
            kind: "session",
            id: session_id.to_string(),
        })?;
        if session.user_id != user_id {
            return Err(StorageError::NotFound { kind: "session", id: session_id.to_string() });
        }
        session.state = state;
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn get_session(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Option<SessionRecord>, StorageError> {
        let inner = self.lock()?;
        Ok(inner
            .sessions
            .get(session_id)
            .filter(|session| session.user_id == user_id)
            .cloned())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            description: "d".to_string(),
            category: "travel".to_string(),
            priority: "high".to_string(),
            time_estimate: "30 minutes".to_string(),
            user_id: "u1".to_string(),
        }
    }

    #[tokio::test]
    async fn tasks_link_in_sequence_order() {
        let store = InMemoryStorage::new();
        let activity = store
            .create_activity(NewActivity {
                title: "Trip".to_string(),
                description: "d".to_string(),
                category: "travel".to_string(),
                status: "active".to_string(),
                user_id: "u1".to_string(),
            })
            .await
            .unwrap();

        let second = store.create_task(new_task("second")).await.unwrap();
        let first = store.create_task(new_task("first")).await.unwrap();
        store.add_task_to_activity(&activity.id, &second.id, 1).await.unwrap();
        store.add_task_to_activity(&activity.id, &first.id, 0).await.unwrap();

        let tasks = store.get_activity_tasks(&activity.id, "u1").await.unwrap();
        let titles: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn linking_unknown_ids_errors() {
        let store = InMemoryStorage::new();
        let err = store.add_task_to_activity("missing", "also-missing", 0).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { kind: "activity", .. }));
    }

    #[tokio::test]
    async fn sessions_round_trip_and_scope_to_user() {
        let store = InMemoryStorage::new();
        assert!(store.get_active_session("u1").await.unwrap().is_none());

        let session = store.create_session("u1", json!({ "phase": "gathering" })).await.unwrap();
        store.update_session(&session.id, json!({ "phase": "completed" }), "u1").await.unwrap();

        let active = store.get_active_session("u1").await.unwrap().unwrap();
        assert_eq!(active.state["phase"], "completed");

        // A different user cannot read or write someone else's session.
        assert!(store.get_session(&session.id, "u2").await.unwrap().is_none());
        assert!(store.update_session(&session.id, json!({}), "u2").await.is_err());
    }
}
