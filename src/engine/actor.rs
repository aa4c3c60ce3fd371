// ============================================================================
// Per-Asset Actor
// Single-writer worker thread serializing all mutations for one asset
// ============================================================================

use crate::domain::{AssetSpec, BookSnapshot, Order, OrderBook, OrderState, OwnerId};
use crate::engine::lifecycle;
use crate::engine::matching::Matcher;
use crate::errors::EngineError;
use crate::interfaces::{EngineEvent, EventHandler};
use crate::settlement::Batcher;
use chrono::Utc;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Levels per side kept in the cached snapshot. Queries deeper than this
/// see a truncated view.
const SNAPSHOT_LEVELS: usize = 32;

/// Commands accepted by an asset worker. Queries never travel this channel.
pub(crate) enum AssetCommand {
    Place {
        order: Arc<Order>,
        reply: Sender<OrderState>,
    },
    Cancel {
        order: Arc<Order>,
        requester: OwnerId,
        reply: Sender<Result<Decimal, EngineError>>,
    },
    SettlementTick,
    Shutdown,
}

/// Handle to one asset's worker thread.
///
/// Mutations are forwarded over the command channel and processed in arrival
/// order, which is what makes cancel/match races deterministic. Reads go
/// through the snapshot cache and never touch the channel.
pub(crate) struct AssetHandle {
    pub(crate) spec: AssetSpec,
    pub(crate) batcher: Batcher,
    snapshot: Arc<RwLock<BookSnapshot>>,
    tx: Sender<AssetCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AssetHandle {
    /// Submit an order for matching and wait for its immediate outcome.
    pub(crate) fn place(&self, order: Arc<Order>) -> Result<OrderState, EngineError> {
        let (reply_tx, reply_rx) = channel::bounded(1);
        self.tx
            .send(AssetCommand::Place {
                order,
                reply: reply_tx,
            })
            .map_err(|_| EngineError::EngineUnavailable)?;
        reply_rx.recv().map_err(|_| EngineError::EngineUnavailable)
    }

    /// Cancel an order's unfilled remainder on the serialized path.
    pub(crate) fn cancel(
        &self,
        order: Arc<Order>,
        requester: OwnerId,
    ) -> Result<Decimal, EngineError> {
        let (reply_tx, reply_rx) = channel::bounded(1);
        self.tx
            .send(AssetCommand::Cancel {
                order,
                requester,
                reply: reply_tx,
            })
            .map_err(|_| EngineError::EngineUnavailable)?;
        reply_rx.recv().map_err(|_| EngineError::EngineUnavailable)?
    }

    /// Sweep expired orders and rotate the settlement batch.
    pub(crate) fn settlement_tick(&self) -> Result<(), EngineError> {
        self.tx
            .send(AssetCommand::SettlementTick)
            .map_err(|_| EngineError::EngineUnavailable)
    }

    pub(crate) fn book_snapshot(&self) -> BookSnapshot {
        self.snapshot.read().clone()
    }

    /// Stop the worker, wait for it to drain, then wait out any in-flight
    /// batch commits so none is abandoned mid-retry.
    pub(crate) fn shutdown(&self) {
        let _ = self.tx.send(AssetCommand::Shutdown);
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
        self.batcher.drain();
    }
}

/// Spawn the single-writer worker for one asset.
pub(crate) fn spawn_asset_worker(
    spec: AssetSpec,
    batcher: Batcher,
    handler: Arc<dyn EventHandler>,
) -> AssetHandle {
    let (tx, rx) = channel::unbounded();
    let snapshot = Arc::new(RwLock::new(BookSnapshot::empty(spec.asset_id.clone())));

    let worker = AssetWorker {
        book: OrderBook::new(spec.asset_id.clone()),
        matcher: Matcher::new(spec.clone()),
        batcher: batcher.clone(),
        handler,
        snapshot: Arc::clone(&snapshot),
        next_sequence: 1,
    };

    let join = thread::spawn(move || worker.run(rx));

    AssetHandle {
        spec,
        batcher,
        snapshot,
        tx,
        worker: Mutex::new(Some(join)),
    }
}

struct AssetWorker {
    book: OrderBook,
    matcher: Matcher,
    batcher: Batcher,
    handler: Arc<dyn EventHandler>,
    snapshot: Arc<RwLock<BookSnapshot>>,
    next_sequence: u64,
}

impl AssetWorker {
    fn run(mut self, rx: Receiver<AssetCommand>) {
        tracing::debug!(asset = %self.book.asset_id, "asset worker started");

        loop {
            match rx.recv() {
                Ok(AssetCommand::Place { order, reply }) => {
                    let state = self.handle_place(order);
                    let _ = reply.send(state);
                },
                Ok(AssetCommand::Cancel {
                    order,
                    requester,
                    reply,
                }) => {
                    let result = self.handle_cancel(order, requester);
                    let _ = reply.send(result);
                },
                Ok(AssetCommand::SettlementTick) => {
                    self.handle_tick();
                },
                Ok(AssetCommand::Shutdown) | Err(_) => break,
            }
        }

        tracing::debug!(asset = %self.book.asset_id, "asset worker stopped");
    }

    fn handle_place(&mut self, order: Arc<Order>) -> OrderState {
        order.set_sequence(self.next_sequence);
        self.next_sequence += 1;

        self.handler.on_event(EngineEvent::OrderPlaced {
            order_id: order.id,
            asset_id: order.asset_id.clone(),
            owner: order.owner.clone(),
            side: order.side,
            price: order.limit_price,
            quantity: order.quantity,
            timestamp: order.submitted_at,
        });

        let outcome = self.matcher.submit(&mut self.book, Arc::clone(&order));

        for trade in outcome.trades {
            let mut trade = trade;
            let batch_id = self.batcher.on_trade(trade.clone());
            trade.settlement_batch_id = Some(batch_id);
            self.handler.on_event(EngineEvent::TradeExecuted {
                timestamp: trade.executed_at,
                trade,
            });
        }

        match outcome.state {
            OrderState::Filled => {
                self.handler.on_event(EngineEvent::OrderFilled {
                    order_id: order.id,
                    total_filled: order.filled_quantity(),
                    timestamp: Utc::now(),
                });
            },
            OrderState::PartiallyFilled => {
                self.handler.on_event(EngineEvent::OrderPartiallyFilled {
                    order_id: order.id,
                    filled_quantity: order.filled_quantity(),
                    remaining_quantity: order.remaining_quantity(),
                    timestamp: Utc::now(),
                });
            },
            _ => {},
        }

        self.refresh_snapshot();
        outcome.state
    }

    fn handle_cancel(
        &mut self,
        order: Arc<Order>,
        requester: OwnerId,
    ) -> Result<Decimal, EngineError> {
        let cancelled = lifecycle::cancel(&mut self.book, &order, &requester)?;

        self.handler.on_event(EngineEvent::OrderCancelled {
            order_id: order.id,
            cancelled_quantity: cancelled,
            timestamp: Utc::now(),
        });

        self.refresh_snapshot();
        Ok(cancelled)
    }

    fn handle_tick(&mut self) {
        let now = Utc::now();
        let expired = lifecycle::expire_due(&mut self.book, now);

        for (order, quantity) in &expired {
            self.handler.on_event(EngineEvent::OrderExpired {
                order_id: order.id,
                expired_quantity: *quantity,
                timestamp: now,
            });
        }

        self.batcher.rotate();

        if !expired.is_empty() {
            self.refresh_snapshot();
        }
    }

    fn refresh_snapshot(&self) {
        *self.snapshot.write() = self.book.depth_snapshot(SNAPSHOT_LEVELS);
    }
}
