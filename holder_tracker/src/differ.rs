use std::sync::Arc;

use abi::{DiffResult, RemovedHolder};

use crate::error::CycleError;
use crate::snapshot::{Snapshot, SnapshotWriter};

/// Rejects a candidate that shrank too much against a large committed set.
///
/// A candidate is suspicious when the committed snapshot holds more than
/// `min_holders` entries and the candidate keeps less than
/// `retention_percent` of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationGuard {
    pub min_holders: usize,
    pub retention_percent: u8,
}

impl Default for PaginationGuard {
    fn default() -> Self {
        Self {
            min_holders: 1000,
            retention_percent: 95,
        }
    }
}

impl PaginationGuard {
    pub fn check(&self, committed: usize, candidate: usize) -> Result<(), CycleError> {
        if committed <= self.min_holders {
            return Ok(());
        }
        // candidate / committed < percent / 100, kept in integers
        let kept = candidate as u128 * 100;
        let required = committed as u128 * u128::from(self.retention_percent);
        if kept < required {
            return Err(CycleError::Integrity {
                committed,
                candidate,
            });
        }
        Ok(())
    }
}

/// Added, updated and removed holders going from `old` to `new`.
pub fn diff(old: &Snapshot, new: &Snapshot) -> DiffResult {
    let mut result = DiffResult::default();

    for (address, holder) in new {
        match old.get(address) {
            None => result.added.push(holder.clone()),
            Some(previous) if previous.balance != holder.balance => {
                result.updated.push(holder.clone())
            }
            Some(_) => {}
        }
    }

    for address in old.keys() {
        if !new.contains_key(address) {
            result.removed.push(RemovedHolder {
                address: address.clone(),
            });
        }
    }

    result
}

/// Owns the committed snapshot and replaces it wholesale on each accepted
/// candidate.
pub struct SnapshotDiffer {
    committed: Arc<Snapshot>,
    guard: PaginationGuard,
    writer: SnapshotWriter,
}

impl SnapshotDiffer {
    pub fn new(guard: PaginationGuard, writer: SnapshotWriter) -> Self {
        Self {
            committed: Arc::new(Snapshot::new()),
            guard,
            writer,
        }
    }

    pub fn committed(&self) -> &Arc<Snapshot> {
        &self.committed
    }

    /// Compares `candidate` against the committed snapshot and commits it.
    ///
    /// Returns `Ok(None)` when nothing changed. On error the candidate is
    /// dropped and the committed snapshot is left as it was.
    pub fn apply(&mut self, candidate: Snapshot) -> Result<Option<DiffResult>, CycleError> {
        self.guard.check(self.committed.len(), candidate.len())?;

        let result = diff(&self.committed, &candidate);
        self.committed = Arc::new(candidate);
        self.writer.publish(Arc::clone(&self.committed));

        if result.is_empty() {
            Ok(None)
        } else {
            Ok(Some(result))
        }
    }
}
