//! Per-thread checkpointing and turn serialisation.
//!
//! Checkpoints are keyed by thread id (`user_<id>`); re-invoking with the
//! same thread id resumes from the persisted state. The in-memory store is
//! the stock implementation; durable backends plug in through the trait.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use crate::GraphError;

/// Stores the latest consistent state per thread.
pub trait Checkpointer<S>: Send + Sync {
    fn load(&self, thread_id: &str) -> Option<S>;
    fn save(&self, thread_id: &str, state: &S);
    fn remove(&self, thread_id: &str);
}

/// Process-local checkpoint store. Accesses to a single thread id are
/// serialised by the turn gate, so a plain RwLock map suffices.
#[derive(Debug)]
pub struct MemoryCheckpointer<S> {
    threads: RwLock<HashMap<String, S>>,
}

impl<S> MemoryCheckpointer<S> {
    pub fn new() -> Self {
        Self { threads: RwLock::new(HashMap::new()) }
    }
}

impl<S> Default for MemoryCheckpointer<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Clone + Send + Sync> Checkpointer<S> for MemoryCheckpointer<S> {
    fn load(&self, thread_id: &str) -> Option<S> {
        self.threads.read().ok()?.get(thread_id).cloned()
    }

    fn save(&self, thread_id: &str, state: &S) {
        if let Ok(mut threads) = self.threads.write() {
            threads.insert(thread_id.to_string(), state.clone());
        }
    }

    fn remove(&self, thread_id: &str) {
        if let Ok(mut threads) = self.threads.write() {
            threads.remove(thread_id);
        }
    }
}

/// Rejects overlapping turns for the same thread id. Turns across different
/// threads proceed in parallel; a second turn for an in-flight thread gets
/// [`GraphError::ThreadBusy`].
#[derive(Debug, Default)]
pub struct TurnGate {
    active: Arc<Mutex<HashSet<String>>>,
}

impl TurnGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, thread_id: &str) -> Result<TurnPermit, GraphError> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| GraphError::ThreadBusy(thread_id.to_string()))?;
        if !active.insert(thread_id.to_string()) {
            return Err(GraphError::ThreadBusy(thread_id.to_string()));
        }
        Ok(TurnPermit { active: Arc::clone(&self.active), thread_id: thread_id.to_string() })
    }
}

/// RAII permit; dropping it releases the thread for the next turn.
#[derive(Debug)]
pub struct TurnPermit {
    active: Arc<Mutex<HashSet<String>>>,
    thread_id: String,
}

impl Drop for TurnPermit {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(&self.thread_id);
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoints_round_trip_per_thread() {
        let store: MemoryCheckpointer<u32> = MemoryCheckpointer::new();
        assert!(store.load("user_1").is_none());

        store.save("user_1", &7);
        store.save("user_2", &9);
        assert_eq!(store.load("user_1"), Some(7));
        assert_eq!(store.load("user_2"), Some(9));

        store.save("user_1", &8);
        assert_eq!(store.load("user_1"), Some(8));

        store.remove("user_1");
        assert!(store.load("user_1").is_none());
        assert_eq!(store.load("user_2"), Some(9));
    }

    #[test]
    fn turn_gate_rejects_overlapping_turns() {
        let gate = TurnGate::new();
        let permit = gate.acquire("user_1").unwrap();

        assert!(matches!(gate.acquire("user_1"), Err(GraphError::ThreadBusy(_))));
        // Other threads are unaffected.
        let other = gate.acquire("user_2").unwrap();
        drop(other);

        drop(permit);
        assert!(gate.acquire("user_1").is_ok());
    }
}
