// ============================================================================
// Exchange Surface
// Multi-asset facade: order entry, cancel, queries, settlement ticking
// ============================================================================

use crate::domain::{
    AssetCatalog, AssetId, BatchId, BookSnapshot, Order, OrderId, OrderState, OwnerId, Side,
};
use crate::engine::actor::{spawn_asset_worker, AssetHandle};
use crate::engine::lifecycle;
use crate::errors::{EngineError, ValidationError};
use crate::interfaces::{EngineEvent, EventHandler, NoOpEventHandler};
use crate::settlement::{
    new_batch_registry, BatchRegistry, BatchStatusView, Batcher, BatcherConfig, InMemoryLedger,
    SettlementLedger,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use crossbeam::channel::{self, Sender};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Exchange-wide configuration. Settlement knobs apply per asset.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// Taker fee rate in basis points of notional
    pub fee_bps: u32,
    /// Commit attempts per batch before degradation
    pub max_commit_attempts: u32,
    /// First commit retry delay; doubles per attempt
    pub initial_backoff: Duration,
    /// Batch window for the background ticker
    pub settlement_interval: Duration,
    /// How long committed/degraded batch views stay queryable
    pub batch_retention: Duration,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            fee_bps: 25,
            max_commit_attempts: 5,
            initial_backoff: Duration::from_millis(250),
            settlement_interval: Duration::from_secs(5),
            batch_retention: Duration::from_secs(3600),
        }
    }
}

/// Point-in-time view of one order, served off the shared index without
/// entering the serialized path.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderStatusView {
    pub order_id: OrderId,
    pub asset_id: AssetId,
    pub owner: OwnerId,
    pub side: Side,
    pub limit_price: Decimal,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    pub remaining_quantity: Decimal,
    pub state: OrderState,
    pub submitted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Multi-asset matching venue.
///
/// Each asset gets its own single-writer worker thread, spawned on first
/// use; assets never contend with each other. Queries read shared
/// eventually-consistent state and are wait-free with respect to matching.
pub struct Exchange {
    catalog: Arc<dyn AssetCatalog>,
    ledger: Arc<dyn SettlementLedger>,
    handler: Arc<dyn EventHandler>,
    config: ExchangeConfig,
    assets: RwLock<HashMap<AssetId, Arc<AssetHandle>>>,
    orders: RwLock<HashMap<OrderId, Arc<Order>>>,
    batches: BatchRegistry,
}

impl Exchange {
    pub fn new(catalog: Arc<dyn AssetCatalog>) -> Self {
        Self::with_config(
            catalog,
            Arc::new(InMemoryLedger::new()),
            Arc::new(NoOpEventHandler),
            ExchangeConfig::default(),
        )
    }

    pub fn with_config(
        catalog: Arc<dyn AssetCatalog>,
        ledger: Arc<dyn SettlementLedger>,
        handler: Arc<dyn EventHandler>,
        config: ExchangeConfig,
    ) -> Self {
        Self {
            catalog,
            ledger,
            handler,
            config,
            assets: RwLock::new(HashMap::new()),
            orders: RwLock::new(HashMap::new()),
            batches: new_batch_registry(),
        }
    }

    /// Place a good-till-cancelled limit order.
    pub fn place_order(
        &self,
        asset_id: AssetId,
        owner: OwnerId,
        side: Side,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<OrderId, EngineError> {
        self.place(asset_id, owner, side, price, quantity, None)
    }

    /// Place a limit order that expires if still resting after `ttl`.
    pub fn place_order_with_ttl(
        &self,
        asset_id: AssetId,
        owner: OwnerId,
        side: Side,
        price: Decimal,
        quantity: Decimal,
        ttl: ChronoDuration,
    ) -> Result<OrderId, EngineError> {
        self.place(asset_id, owner, side, price, quantity, Some(Utc::now() + ttl))
    }

    fn place(
        &self,
        asset_id: AssetId,
        owner: OwnerId,
        side: Side,
        price: Decimal,
        quantity: Decimal,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<OrderId, EngineError> {
        let handle = self.asset_handle(&asset_id)?;

        if let Err(reason) = lifecycle::validate(&handle.spec, price, quantity) {
            self.handler.on_event(EngineEvent::OrderRejected {
                asset_id,
                owner,
                reason: reason.to_string(),
                timestamp: Utc::now(),
            });
            return Err(EngineError::Validation(reason));
        }

        let order = Arc::new(Order::new(asset_id, owner, side, price, quantity, expires_at));
        let order_id = order.id;
        self.orders.write().insert(order_id, Arc::clone(&order));

        handle.place(order)?;
        Ok(order_id)
    }

    /// Cancel the unfilled remainder of an order. Returns the cancelled
    /// quantity; fills already produced are untouched.
    pub fn cancel_order(
        &self,
        order_id: &OrderId,
        requester: &OwnerId,
    ) -> Result<Decimal, EngineError> {
        let order = self
            .orders
            .read()
            .get(order_id)
            .cloned()
            .ok_or(EngineError::OrderNotFound(*order_id))?;
        let handle = self.asset_handle(&order.asset_id)?;
        handle.cancel(order, requester.clone())
    }

    pub fn order_status(&self, order_id: &OrderId) -> Result<OrderStatusView, EngineError> {
        let order = self
            .orders
            .read()
            .get(order_id)
            .cloned()
            .ok_or(EngineError::OrderNotFound(*order_id))?;

        Ok(OrderStatusView {
            order_id: order.id,
            asset_id: order.asset_id.clone(),
            owner: order.owner.clone(),
            side: order.side,
            limit_price: order.limit_price,
            quantity: order.quantity,
            filled_quantity: order.filled_quantity(),
            remaining_quantity: order.remaining_quantity(),
            state: order.state(),
            submitted_at: order.submitted_at,
            expires_at: order.expires_at,
        })
    }

    /// Aggregated book depth for one asset, up to `depth` levels per side.
    /// Served from the snapshot cache; may trail the book by one command.
    pub fn book_snapshot(
        &self,
        asset_id: &AssetId,
        depth: usize,
    ) -> Result<BookSnapshot, EngineError> {
        if let Some(handle) = self.assets.read().get(asset_id) {
            return Ok(handle.book_snapshot().truncated(depth));
        }
        if self.catalog.lookup(asset_id).is_some() {
            return Ok(BookSnapshot::empty(asset_id.clone()));
        }
        Err(EngineError::Validation(ValidationError::UnknownAsset(
            asset_id.clone(),
        )))
    }

    pub fn batch_status(&self, batch_id: &BatchId) -> Result<BatchStatusView, EngineError> {
        self.batches
            .read()
            .get(batch_id)
            .cloned()
            .ok_or(EngineError::UnknownBatch(*batch_id))
    }

    /// Id of the batch currently collecting an asset's trades.
    pub fn open_batch_id(&self, asset_id: &AssetId) -> Result<BatchId, EngineError> {
        let handle = self.asset_handle(asset_id)?;
        Ok(handle.batcher.open_batch_id())
    }

    /// Close and commit the asset's current batch, sweeping expired orders
    /// first. The commit runs in the background.
    pub fn settlement_tick(&self, asset_id: &AssetId) -> Result<(), EngineError> {
        self.archive_terminal_orders();
        let handle = self.asset_handle(asset_id)?;
        handle.settlement_tick()
    }

    /// Tick every active asset.
    pub fn settlement_tick_all(&self) {
        self.archive_terminal_orders();
        let handles: Vec<Arc<AssetHandle>> = self.assets.read().values().cloned().collect();
        for handle in handles {
            let _ = handle.settlement_tick();
        }
    }

    /// Drop terminal orders from the shared index on the settlement clock.
    ///
    /// Runs before the tick is dispatched, so an order that goes terminal
    /// during this tick stays queryable until the next one. Fills live on
    /// in trades, batches, and events; batches hold trade copies, never
    /// order references.
    fn archive_terminal_orders(&self) {
        self.orders
            .write()
            .retain(|_, order| !order.state().is_terminal());
    }

    /// Start a background thread ticking all assets on the configured
    /// interval. The ticker stops when dropped or when the exchange goes
    /// away.
    pub fn start_settlement_ticker(self: &Arc<Self>) -> SettlementTicker {
        let exchange = Arc::downgrade(self);
        let interval = self.config.settlement_interval;
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);

        let join = std::thread::spawn(move || {
            let clock = channel::tick(interval);
            loop {
                crossbeam::channel::select! {
                    recv(clock) -> _ => {
                        match exchange.upgrade() {
                            Some(exchange) => exchange.settlement_tick_all(),
                            None => break,
                        }
                    },
                    recv(stop_rx) -> _ => break,
                }
            }
        });

        SettlementTicker {
            stop: Some(stop_tx),
            worker: Some(join),
        }
    }

    /// Worker handle for the asset, spawning it on first use.
    fn asset_handle(&self, asset_id: &AssetId) -> Result<Arc<AssetHandle>, EngineError> {
        if let Some(handle) = self.assets.read().get(asset_id) {
            return Ok(Arc::clone(handle));
        }

        let spec = self.catalog.lookup(asset_id).ok_or_else(|| {
            EngineError::Validation(ValidationError::UnknownAsset(asset_id.clone()))
        })?;

        let mut assets = self.assets.write();
        // Another writer may have spawned it between the locks
        if let Some(handle) = assets.get(asset_id) {
            return Ok(Arc::clone(handle));
        }

        tracing::info!(asset = %asset_id, "starting asset worker");

        let batcher = Batcher::new(
            asset_id.clone(),
            BatcherConfig {
                fee_bps: self.config.fee_bps,
                price_decimals: spec.price_decimals,
                max_commit_attempts: self.config.max_commit_attempts,
                initial_backoff: self.config.initial_backoff,
                registry_retention: self.config.batch_retention,
            },
            Arc::clone(&self.ledger),
            Arc::clone(&self.handler),
            Arc::clone(&self.batches),
        );
        let handle = Arc::new(spawn_asset_worker(
            spec,
            batcher,
            Arc::clone(&self.handler),
        ));
        assets.insert(asset_id.clone(), Arc::clone(&handle));
        Ok(handle)
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        for handle in self.assets.read().values() {
            handle.shutdown();
        }
    }
}

/// Handle to the background settlement clock. Dropping it stops the clock.
pub struct SettlementTicker {
    stop: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl SettlementTicker {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the sender disconnects the stop channel; the worker's
        // select sees the disconnect and exits
        self.stop.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for SettlementTicker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
