// ============================================================================
// Settlement Module
// Trade batching and ledger commit, decoupled from the matching path
// ============================================================================

mod batcher;
mod ledger;

pub use batcher::{new_batch_registry, BatchRegistry, BatchStatusView, Batcher, BatcherConfig};
pub use ledger::{InMemoryLedger, SettlementLedger};
