//! Bounded ring of recently applied actions.

#![allow(missing_docs)]

use std::collections::VecDeque;

use crate::violations::HistoryEntry;

pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Fixed-capacity FIFO of [`HistoryEntry`]; the oldest entry falls out first.
#[derive(Debug, Clone)]
pub struct HistoryRing {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl Default for HistoryRing {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// The last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<HistoryEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::violations::ActionSummary;
    use chrono::Utc;
    use serde_json::Value;

    fn entry(step: u64) -> HistoryEntry {
        HistoryEntry {
            step,
            phase: "main".to_string(),
            actor: None,
            action: ActionSummary {
                label: "noop".to_string(),
                category: "noop".to_string(),
                payload: Value::Null,
            },
            at: Utc::now(),
        }
    }

    #[test]
    fn oldest_entries_fall_out() {
        let mut ring = HistoryRing::new(3);
        for step in 1..=5 {
            ring.push(entry(step));
        }
        assert_eq!(ring.len(), 3);
        let steps: Vec<u64> = ring.recent(10).iter().map(|e| e.step).collect();
        assert_eq!(steps, vec![3, 4, 5]);
    }

    #[test]
    fn recent_returns_tail_in_order() {
        let mut ring = HistoryRing::default();
        for step in 1..=12 {
            ring.push(entry(step));
        }
        let steps: Vec<u64> = ring.recent(2).iter().map(|e| e.step).collect();
        assert_eq!(steps, vec![11, 12]);
        ring.clear();
        assert!(ring.is_empty());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut ring = HistoryRing::new(0);
        ring.push(entry(1));
        ring.push(entry(2));
        assert_eq!(ring.capacity(), 1);
        assert_eq!(ring.recent(5)[0].step, 2);
    }
}
