//! The node/edge executor.
//!
//! Nodes are async units keyed by name; after each successful node the
//! runtime applies the returned update, checkpoints the merged state, and
//! evaluates the node's routing function. A failing node surfaces its error
//! while checkpoints from prior successful nodes stay intact, so the next
//! turn resumes from the last consistent state.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::GraphError;
use crate::checkpoint::Checkpointer;

/// Upper bound on nodes per turn. A planning turn is a short walk; anything
/// past this is a routing cycle.
const MAX_STEPS: usize = 16;

/// State driven through the graph. `apply` runs the channel reducers.
pub trait GraphState: Clone + Send + Sync + 'static {
    type Update: Send + 'static;
    fn apply(&mut self, update: Self::Update);
}

impl GraphState for crate::state::SessionState {
    type Update = crate::state::StateUpdate;
    fn apply(&mut self, update: Self::Update) {
        // Dispatches to the inherent reducer implementation in `state`.
        self.apply(update);
    }
}

/// Where to go after a node finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Continue(&'static str),
    End,
}

/// A single decision step.
#[async_trait]
pub trait Node<S: GraphState>: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self, state: &S) -> Result<S::Update>;
}

type Router<S> = Box<dyn Fn(&S) -> Next + Send + Sync>;

/// A directed graph of nodes with a single entry point.
pub struct Graph<S: GraphState> {
    entry: &'static str,
    nodes: HashMap<&'static str, (Box<dyn Node<S>>, Router<S>)>,
}

impl<S: GraphState> Graph<S> {
    pub fn new(entry: &'static str) -> Self {
        Self { entry, nodes: HashMap::new() }
    }

    pub fn add_node(
        &mut self,
        node: Box<dyn Node<S>>,
        router: impl Fn(&S) -> Next + Send + Sync + 'static,
    ) {
        self.nodes.insert(node.name(), (node, Box::new(router)));
    }

    pub fn entry(&self) -> &'static str {
        self.entry
    }

    /// Execute one turn: run nodes from the entry until a router returns
    /// [`Next::End`], checkpointing after every successful node.
    pub async fn run(
        &self,
        checkpointer: &dyn Checkpointer<S>,
        thread_id: &str,
        mut state: S,
    ) -> Result<S, GraphError> {
        let mut current = self.entry;

        for _step in 0..MAX_STEPS {
            let (node, router) =
                self.nodes.get(current).ok_or(GraphError::UnknownNode(current))?;

            debug!(node = current, thread = thread_id, "running node");
            let update = node
                .run(&state)
                .await
                .map_err(|source| GraphError::Node { node: current, source })?;

            state.apply(update);
            checkpointer.save(thread_id, &state);

            match router(&state) {
                Next::End => return Ok(state),
                Next::Continue(next) => current = next,
            }
        }

        Err(GraphError::StepLimit(MAX_STEPS))
    }
}

impl<S: GraphState> std::fmt::Debug for Graph<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.nodes.keys().collect();
        names.sort();
        f.debug_struct("Graph").field("entry", &self.entry).field("nodes", &names).finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
