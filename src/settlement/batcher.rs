// ============================================================================
// Settlement Batcher
// Collects trades into time-boxed batches and commits them off the
// matching path
// ============================================================================

use super::ledger::SettlementLedger;
use crate::domain::{AssetId, BatchId, BatchStatus, SettlementBatch, Trade};
use crate::interfaces::{EngineEvent, EventHandler};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Commit behaviour for one asset's batcher.
#[derive(Debug, Clone)]
pub struct BatcherConfig {
    /// Taker fee rate in basis points of notional
    pub fee_bps: u32,
    /// Quote currency precision for fee rounding
    pub price_decimals: u32,
    /// Total commit attempts before a batch is marked degraded
    pub max_commit_attempts: u32,
    /// First retry delay; doubles per attempt
    pub initial_backoff: Duration,
    /// How long committed/degraded batch views stay queryable before they
    /// are archived out of the registry
    pub registry_retention: Duration,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            fee_bps: 25,
            price_decimals: 2,
            max_commit_attempts: 5,
            initial_backoff: Duration::from_millis(250),
            registry_retention: Duration::from_secs(3600),
        }
    }
}

/// Queryable state of a batch, kept current across its lifecycle.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BatchStatusView {
    pub batch_id: BatchId,
    pub asset_id: AssetId,
    pub status: BatchStatus,
    pub trade_count: usize,
    pub opened_at: DateTime<Utc>,
    pub committed_at: Option<DateTime<Utc>>,
}

/// Shared registry of batch state across all assets, serving
/// `batch_status` queries without touching any matching path.
pub type BatchRegistry = Arc<RwLock<HashMap<BatchId, BatchStatusView>>>;

pub fn new_batch_registry() -> BatchRegistry {
    Arc::new(RwLock::new(HashMap::new()))
}

/// Per-asset settlement batcher.
///
/// `on_trade` is called synchronously from the matching path and only takes
/// the open-batch lock; `rotate` freezes the current batch, opens the next
/// one immediately so matching is never blocked, and hands the frozen batch
/// to a commit worker thread. Ledger I/O and retries happen entirely on
/// that worker.
#[derive(Clone)]
pub struct Batcher {
    inner: Arc<BatcherInner>,
}

struct BatcherInner {
    asset_id: AssetId,
    config: BatcherConfig,
    ledger: Arc<dyn SettlementLedger>,
    handler: Arc<dyn EventHandler>,
    registry: BatchRegistry,
    open: Mutex<SettlementBatch>,
    commit_workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl Batcher {
    pub fn new(
        asset_id: AssetId,
        config: BatcherConfig,
        ledger: Arc<dyn SettlementLedger>,
        handler: Arc<dyn EventHandler>,
        registry: BatchRegistry,
    ) -> Self {
        let batch = SettlementBatch::open(asset_id.clone());
        register_batch(&registry, &batch);
        handler.on_event(EngineEvent::BatchOpened {
            batch_id: batch.id,
            asset_id: asset_id.clone(),
            timestamp: Utc::now(),
        });

        Self {
            inner: Arc::new(BatcherInner {
                asset_id,
                config,
                ledger,
                handler,
                registry,
                open: Mutex::new(batch),
                commit_workers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Enqueue a trade into the currently-open batch.
    /// Returns the owning batch id.
    pub fn on_trade(&self, trade: Trade) -> BatchId {
        let mut open = self.inner.open.lock();
        open.push(trade);

        let batch_id = open.id;
        let trade_count = open.trade_count();
        drop(open);

        if let Some(view) = self.inner.registry.write().get_mut(&batch_id) {
            view.trade_count = trade_count;
        }
        batch_id
    }

    /// Close the current batch, open its successor, and commit the closed
    /// one in the background. A batch with no trades stays open; there is
    /// nothing to commit.
    pub fn rotate(&self) -> Option<BatchId> {
        let mut closed = {
            let mut open = self.inner.open.lock();
            if open.is_empty() {
                return None;
            }

            let next = SettlementBatch::open(self.inner.asset_id.clone());
            register_batch(&self.inner.registry, &next);
            self.inner.handler.on_event(EngineEvent::BatchOpened {
                batch_id: next.id,
                asset_id: self.inner.asset_id.clone(),
                timestamp: Utc::now(),
            });

            std::mem::replace(&mut *open, next)
        };

        closed.close();
        closed.compute_fees(self.inner.config.fee_bps, self.inner.config.price_decimals);

        let batch_id = closed.id;
        if let Some(view) = self.inner.registry.write().get_mut(&batch_id) {
            view.status = BatchStatus::Closing;
            view.trade_count = closed.trade_count();
        }

        tracing::debug!(
            asset = %self.inner.asset_id,
            batch = %batch_id,
            trades = closed.trade_count(),
            "settlement batch closed"
        );

        // Evict before the commit worker starts, so the batch closed in this
        // rotation is still `Closing` and cannot be archived early
        self.archive_expired_views();

        let inner = Arc::clone(&self.inner);
        let worker = thread::spawn(move || commit_with_retry(inner, closed));
        let mut workers = self.inner.commit_workers.lock();
        workers.retain(|handle| !handle.is_finished());
        workers.push(worker);

        Some(batch_id)
    }

    /// Id of the batch currently accepting trades.
    pub fn open_batch_id(&self) -> BatchId {
        self.inner.open.lock().id
    }

    /// Wait for every in-flight commit to finish (committed or degraded).
    /// Called on shutdown so no batch is left stuck in `Closing`.
    pub fn drain(&self) {
        let workers = std::mem::take(&mut *self.inner.commit_workers.lock());
        for worker in workers {
            let _ = worker.join();
        }
    }

    /// Archive terminal batch views older than the retention window.
    /// In-flight (`Open`/`Closing`) batches are never evicted.
    fn archive_expired_views(&self) {
        let retention = match chrono::Duration::from_std(self.inner.config.registry_retention) {
            Ok(retention) => retention,
            Err(_) => return, // retention too large to expire anything
        };
        let cutoff = Utc::now() - retention;

        self.inner.registry.write().retain(|_, view| {
            view.asset_id != self.inner.asset_id
                || !matches!(view.status, BatchStatus::Committed | BatchStatus::Degraded)
                || view.opened_at >= cutoff
        });
    }
}

fn register_batch(registry: &BatchRegistry, batch: &SettlementBatch) {
    registry.write().insert(
        batch.id,
        BatchStatusView {
            batch_id: batch.id,
            asset_id: batch.asset_id.clone(),
            status: BatchStatus::Open,
            trade_count: 0,
            opened_at: batch.opened_at,
            committed_at: None,
        },
    );
}

/// Commit a closed batch with bounded exponential backoff.
///
/// Exhausting the retries marks the batch degraded; its trades remain valid
/// and queryable, and no book state is ever unwound.
fn commit_with_retry(inner: Arc<BatcherInner>, mut batch: SettlementBatch) {
    let summary = batch.summary();
    let mut delay = inner.config.initial_backoff;
    let mut last_error = None;

    for attempt in 1..=inner.config.max_commit_attempts {
        match inner.ledger.commit_batch(&summary) {
            Ok(()) => {
                batch.mark_committed();
                let committed_at = Utc::now();
                if let Some(view) = inner.registry.write().get_mut(&batch.id) {
                    view.status = BatchStatus::Committed;
                    view.committed_at = Some(committed_at);
                }
                tracing::info!(
                    asset = %inner.asset_id,
                    batch = %batch.id,
                    trades = batch.trade_count(),
                    attempt,
                    "settlement batch committed"
                );
                inner.handler.on_event(EngineEvent::BatchCommitted {
                    summary,
                    timestamp: committed_at,
                });
                return;
            },
            Err(err) => {
                tracing::warn!(
                    asset = %inner.asset_id,
                    batch = %batch.id,
                    attempt,
                    error = %err,
                    "settlement commit failed"
                );
                last_error = Some(err);
                if attempt < inner.config.max_commit_attempts {
                    thread::sleep(delay);
                    delay *= 2;
                }
            },
        }
    }

    batch.mark_degraded();
    if let Some(view) = inner.registry.write().get_mut(&batch.id) {
        view.status = BatchStatus::Degraded;
    }

    let error = last_error
        .map(|err| err.to_string())
        .unwrap_or_else(|| "unknown settlement failure".to_string());
    tracing::error!(
        asset = %inner.asset_id,
        batch = %batch.id,
        error = %error,
        "settlement batch degraded after exhausting retries"
    );
    inner.handler.on_event(EngineEvent::BatchDegraded {
        batch_id: batch.id,
        asset_id: inner.asset_id.clone(),
        error,
        timestamp: Utc::now(),
    });
}
