use crate::engine::ComputationResult;
use serde::{Deserialize, Serialize};

/// A result as recorded in the session log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// 1-based position in session order
    pub position: u64,
    pub result: ComputationResult,
}

/// In-memory log of the results of one session.
///
/// Append-only and unbounded: every calculation of the session is kept until
/// `clear` or until the store is dropped. Memory grows with the number of
/// calculations; a long-running host that shares a process across sessions
/// should drop the store with the session.
#[derive(Debug, Clone, Default)]
pub struct HistoryStore {
    entries: Vec<HistoryEntry>,
    next_position: u64,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `result` and return its position. Identical results are kept.
    pub fn append(&mut self, result: ComputationResult) -> u64 {
        self.next_position += 1;
        let position = self.next_position;
        log::debug!(
            "History #{}: {} = {} {}",
            position,
            result.formula_id(),
            result.output(),
            result.unit()
        );
        self.entries.push(HistoryEntry { position, result });
        position
    }

    /// Most recent first
    pub fn list(&self) -> Vec<&HistoryEntry> {
        self.entries.iter().rev().collect()
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every entry. Positions keep counting up.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
