//! Dispatcher-owned bookkeeping: busy keys and per-key pending updates.
//!
//! Both structures are plain maps touched only from the dispatch loop.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::model::GraphUpdate;

/// Keys with a mutation currently in flight.
#[derive(Debug, Default)]
pub struct KeyRegistry {
    busy: HashSet<String>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a key busy. Returns `false` if it already was.
    pub fn acquire(&mut self, key: &str) -> bool {
        self.busy.insert(key.to_string())
    }

    pub fn release(&mut self, key: &str) -> bool {
        self.busy.remove(key)
    }

    pub fn is_busy(&self, key: &str) -> bool {
        self.busy.contains(key)
    }

    pub fn len(&self) -> usize {
        self.busy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.busy.is_empty()
    }
}

/// Per-key FIFO of updates waiting for their key to become free.
#[derive(Debug, Default)]
pub struct Backlog {
    queues: HashMap<String, VecDeque<GraphUpdate>>,
}

impl Backlog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&mut self, key: &str, update: GraphUpdate) {
        self.queues
            .entry(key.to_string())
            .or_default()
            .push_back(update);
    }

    /// Put an update ahead of everything else queued for its key.
    pub fn push_front(&mut self, key: &str, update: GraphUpdate) {
        self.queues
            .entry(key.to_string())
            .or_default()
            .push_front(update);
    }

    /// Oldest pending update for a key. Empty queues are dropped.
    pub fn pop(&mut self, key: &str) -> Option<GraphUpdate> {
        let queue = self.queues.get_mut(key)?;
        let update = queue.pop_front();
        if queue.is_empty() {
            self.queues.remove(key);
        }
        update
    }

    pub fn has_pending(&self, key: &str) -> bool {
        self.queues.contains_key(key)
    }

    /// Keys with at least one pending update.
    pub fn keys(&self) -> Vec<String> {
        self.queues.keys().cloned().collect()
    }

    /// Total pending updates across all keys.
    pub fn len(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}
