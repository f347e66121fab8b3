use thiserror::Error;

use crate::storage::StorageError;
use planmind_graph::GraphError;
use planmind_llm::LlmError;

#[derive(Debug, Error)]
pub enum PlannerError {
    /// `use_graph_engine = false` selects the legacy orchestrator, which is
    /// not shipped.
    #[error("the legacy (non-graph) planning engine is not available; set use_graph_engine = true")]
    LegacyEngineUnavailable,

    #[error("a turn is already in flight for user {0}")]
    Busy(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("activity creation failed: {0}")]
    ActivityCreation(#[from] StorageError),

    #[error("no storage collaborator is configured")]
    StorageUnavailable,
}
