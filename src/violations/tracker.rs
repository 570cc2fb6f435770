//! Violation registry: deduplicates reports into persistent records.

#![allow(missing_docs)]

use std::sync::Arc;

use crate::core::errors::Result;
use crate::invariants::Violation;
use crate::store::{HarnessStore, ViolationRecord};
use crate::violations::fingerprint::Fingerprinter;
use crate::violations::report::Report;

/// Default sample ring size per record.
pub const DEFAULT_SAMPLE_CAPACITY: usize = 5;

/// Fingerprints violations and folds reports into deduplicated records.
pub struct ViolationRegistry {
    store: Arc<HarnessStore>,
    fingerprinter: Fingerprinter,
    sample_capacity: usize,
}

impl ViolationRegistry {
    pub fn new(store: Arc<HarnessStore>, sample_capacity: usize) -> Result<Self> {
        Ok(Self::with_fingerprinter(
            store,
            Fingerprinter::new()?,
            sample_capacity,
        ))
    }

    pub fn with_fingerprinter(
        store: Arc<HarnessStore>,
        fingerprinter: Fingerprinter,
        sample_capacity: usize,
    ) -> Self {
        Self {
            store,
            fingerprinter,
            sample_capacity: sample_capacity.max(1),
        }
    }

    pub fn fingerprint(&self, violation: &Violation) -> String {
        self.fingerprinter.fingerprint(violation)
    }

    /// Create or update the record for `report.fingerprint`.
    ///
    /// Lookup and write happen in one transaction, so concurrent recorders of
    /// the same fingerprint each add exactly one occurrence.
    pub fn record(&self, report: &Report) -> Result<ViolationRecord> {
        let capacity = self.sample_capacity;
        self.store.atomically(|txn| {
            let record = match txn.get_violation(&report.fingerprint)? {
                Some(mut existing) => {
                    existing.absorb(report, capacity);
                    existing
                }
                None => ViolationRecord::first(report),
            };
            txn.upsert_violation(&record)?;
            Ok(record)
        })
    }

    pub fn get(&self, fingerprint: &str) -> Result<Option<ViolationRecord>> {
        self.store.get_violation(fingerprint)
    }

    pub fn all(&self) -> Result<Vec<ViolationRecord>> {
        self.store.get_all_violations()
    }

    pub fn get_unsynced(&self, min_occurrences: u64) -> Result<Vec<ViolationRecord>> {
        self.store.get_unsynced(min_occurrences)
    }

    /// Mark a record reported. Leaves counts and samples untouched.
    pub fn mark_synced(&self, fingerprint: &str, remote_id: &str) -> Result<bool> {
        self.store.mark_synced(fingerprint, remote_id)
    }

    pub fn store(&self) -> &Arc<HarnessStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::violations::report::fixtures;
    use std::thread;

    fn registry() -> (tempfile::TempDir, ViolationRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(HarnessStore::open(&dir.path().join("v.db")).unwrap());
        (dir, ViolationRegistry::new(store, DEFAULT_SAMPLE_CAPACITY).unwrap())
    }

    #[test]
    fn first_record_then_increment() {
        let (_dir, reg) = registry();
        let report = fixtures::report("zombie-entity", "zombie-entity:01");
        let first = reg.record(&report).unwrap();
        assert_eq!(first.occurrence_count, 1);
        assert!(!first.synced_to_remote);

        let second = reg.record(&report).unwrap();
        assert_eq!(second.occurrence_count, 2);
        assert_eq!(second.first_seen, first.first_seen);
        assert_eq!(reg.all().unwrap().len(), 1);
    }

    #[test]
    fn sample_ring_bounded_in_store() {
        let (_dir, reg) = registry();
        let report = fixtures::report("hand-overflow", "hand-overflow:01");
        for _ in 0..12 {
            reg.record(&report).unwrap();
        }
        let stored = reg.get("hand-overflow:01").unwrap().unwrap();
        assert_eq!(stored.occurrence_count, 12);
        assert_eq!(stored.samples.len(), DEFAULT_SAMPLE_CAPACITY);
    }

    #[test]
    fn recording_after_sync_keeps_sync_state() {
        let (_dir, reg) = registry();
        let report = fixtures::report("duplicate-id", "duplicate-id:01");
        reg.record(&report).unwrap();
        assert!(reg.mark_synced("duplicate-id:01", "42").unwrap());

        let again = reg.record(&report).unwrap();
        assert_eq!(again.occurrence_count, 2);
        assert!(again.synced_to_remote);
        assert_eq!(again.remote_id.as_deref(), Some("42"));
        assert!(reg.get_unsynced(1).unwrap().is_empty());
    }

    #[test]
    fn concurrent_recorders_lose_no_occurrences() {
        let (_dir, reg) = registry();
        let reg = Arc::new(reg);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let reg = Arc::clone(&reg);
                thread::spawn(move || {
                    let report = fixtures::report("energy-mismatch", "energy-mismatch:01");
                    for _ in 0..25 {
                        reg.record(&report).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let record = reg.get("energy-mismatch:01").unwrap().unwrap();
        assert_eq!(record.occurrence_count, 100);
    }
}
