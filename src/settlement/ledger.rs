// ============================================================================
// Settlement Ledger Interface
// Boundary to the external on-chain/ledger settlement collaborator
// ============================================================================

use crate::domain::BatchSummary;
use crate::errors::SettlementError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

/// External settlement collaborator.
///
/// Commits must be idempotent on the ledger side: the batcher may retry a
/// batch that was partially acknowledged.
pub trait SettlementLedger: Send + Sync {
    fn commit_batch(&self, summary: &BatchSummary) -> Result<(), SettlementError>;
}

/// In-memory ledger for tests and embedded deployments.
///
/// Can be configured to fail its first N commit attempts, which exercises
/// the batcher's retry and degradation paths.
#[derive(Default)]
pub struct InMemoryLedger {
    committed: Mutex<Vec<BatchSummary>>,
    failures_remaining: AtomicU32,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger that rejects the first `failures` commit attempts.
    pub fn failing(failures: u32) -> Self {
        Self {
            committed: Mutex::new(Vec::new()),
            failures_remaining: AtomicU32::new(failures),
        }
    }

    pub fn committed(&self) -> Vec<BatchSummary> {
        self.committed.lock().clone()
    }

    pub fn commit_count(&self) -> usize {
        self.committed.lock().len()
    }
}

impl SettlementLedger for InMemoryLedger {
    fn commit_batch(&self, summary: &BatchSummary) -> Result<(), SettlementError> {
        let remaining = self.failures_remaining.load(Ordering::Acquire);
        if remaining > 0
            && self
                .failures_remaining
                .compare_exchange(remaining, remaining - 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            return Err(SettlementError::LedgerUnavailable(
                "injected commit failure".to_string(),
            ));
        }

        self.committed.lock().push(summary.clone());
        Ok(())
    }
}
