//! Checkpointed state-machine runtime.
//!
//! A planning turn is a finite walk over a directed graph of nodes. Each
//! node returns a partial update; the runtime applies the per-channel
//! reducers, checkpoints the merged state, and asks the node's routing
//! function where to go next. Threads (one per user) are isolated and
//! serialised: overlapping turns for the same thread are rejected rather
//! than interleaved.

use thiserror::Error;

pub mod checkpoint;
pub mod graph;
pub mod state;

pub use checkpoint::{Checkpointer, MemoryCheckpointer, TurnGate, TurnPermit};
pub use graph::{Graph, GraphState, Next, Node};
pub use state::{
    AnsweredQuestion, ChatTurn, CreatedActivity, Phase, Plan, PlanTask, Progress, Role,
    SessionState, StateUpdate, TaskPriority,
};

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("unknown node {0:?}")]
    UnknownNode(&'static str),

    #[error("node {node} failed: {source}")]
    Node {
        node: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("a turn is already in flight for thread {0}")]
    ThreadBusy(String),

    #[error("graph exceeded {0} steps without reaching END")]
    StepLimit(usize),
}
