use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{MovementId, OrderId, StockRecordId};
use domain::{
    MovementKind, MovementRequest, NewOrder, Order, OrderLine, StatusChange, StockMovement,
    StockRecord, VariantKey, clamped_decrement,
};
use tokio::sync::RwLock;

use crate::{
    OrderQuery, Result, StoreError,
    store::{LedgerStore, MovementReceipt},
};

/// A backend failure the in-memory store can be told to simulate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Failure {
    /// Writing order lines fails, rolling back the order.
    LineInsert,
    /// Stock record lookups fail.
    Lookup,
    /// Stock record creation fails.
    Create,
    /// Movements against this record fail before anything is written.
    Movement(StockRecordId),
    /// Movements against this record commit, but the caller is told they
    /// failed, as when a response is lost to a timeout.
    MovementAckLost(StockRecordId),
}

type MovementKey = (OrderId, StockRecordId, MovementKind);

#[derive(Default)]
struct LedgerState {
    orders: HashMap<OrderId, Order>,
    order_sequence: Vec<OrderId>,
    lines: HashMap<OrderId, Vec<OrderLine>>,
    records: HashMap<StockRecordId, StockRecord>,
    records_by_key: HashMap<VariantKey, StockRecordId>,
    movements: Vec<StockMovement>,
    movements_by_key: HashMap<MovementKey, usize>,
    history: Vec<StatusChange>,
    failures: HashSet<Failure>,
}

impl LedgerState {
    fn failing(&self, failure: Failure) -> Result<()> {
        if self.failures.contains(&failure) {
            return Err(StoreError::Unavailable(format!("simulated {failure:?}")));
        }
        Ok(())
    }
}

/// In-memory ledger store implementation for testing and local runs.
///
/// Every operation runs under a single write lock, which gives the same
/// atomicity the PostgreSQL implementation gets from transactions.
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedgerStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts simulating `failure` until cleared.
    pub async fn inject(&self, failure: Failure) {
        self.state.write().await.failures.insert(failure);
    }

    /// Stops simulating `failure`.
    pub async fn recover(&self, failure: &Failure) {
        self.state.write().await.failures.remove(failure);
    }

    /// Stops simulating all failures.
    pub async fn clear_failures(&self) {
        self.state.write().await.failures.clear();
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns the total number of movements logged.
    pub async fn movement_count(&self) -> usize {
        self.state.read().await.movements.len()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert_order(&self, new_order: &NewOrder) -> Result<()> {
        let mut state = self.state.write().await;
        let order_id = new_order.order.id();

        if state.orders.contains_key(&order_id) {
            return Err(StoreError::DuplicateOrder(order_id));
        }
        if state.failures.contains(&Failure::LineInsert) {
            return Err(StoreError::LineInsert {
                order_id,
                position: 0,
                reason: "simulated line insert failure".to_string(),
                transient: false,
            });
        }

        state.orders.insert(order_id, new_order.order.clone());
        state.order_sequence.push(order_id);
        state.lines.insert(order_id, new_order.lines.clone());
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }

    async fn get_order_lines(&self, order_id: OrderId) -> Result<Vec<OrderLine>> {
        let state = self.state.read().await;
        let mut lines = state.lines.get(&order_id).cloned().unwrap_or_default();
        lines.sort_by_key(OrderLine::position);
        Ok(lines)
    }

    async fn query_orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);

        Ok(state
            .order_sequence
            .iter()
            .rev()
            .filter_map(|id| state.orders.get(id))
            .filter(|order| query.matches(order))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_stock_record(&self, key: &VariantKey) -> Result<Option<StockRecord>> {
        let state = self.state.read().await;
        state.failing(Failure::Lookup)?;
        Ok(state
            .records_by_key
            .get(key)
            .and_then(|id| state.records.get(id))
            .cloned())
    }

    async fn get_stock_record(&self, id: StockRecordId) -> Result<Option<StockRecord>> {
        Ok(self.state.read().await.records.get(&id).cloned())
    }

    async fn create_stock_record(&self, key: &VariantKey) -> Result<StockRecord> {
        let mut state = self.state.write().await;
        state.failing(Failure::Create)?;

        if let Some(existing) = state
            .records_by_key
            .get(key)
            .and_then(|id| state.records.get(id))
        {
            return Ok(existing.clone());
        }

        let record = StockRecord::empty(key.clone());
        state.records_by_key.insert(key.clone(), record.id);
        state.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn apply_movement(&self, request: MovementRequest) -> Result<MovementReceipt> {
        let mut state = self.state.write().await;
        let record_id = request.stock_record_id;
        state.failing(Failure::Movement(record_id))?;

        let key = request
            .order_id
            .map(|order_id| (order_id, record_id, request.kind));
        if let Some(index) = key.and_then(|k| state.movements_by_key.get(&k).copied()) {
            return Ok(MovementReceipt {
                movement: state.movements[index].clone(),
                replayed: true,
            });
        }

        let now = Utc::now();
        let record = state
            .records
            .get_mut(&record_id)
            .ok_or(StoreError::StockRecordNotFound(record_id))?;

        let (available, applied) = match request.kind {
            MovementKind::Decrement => {
                let result = clamped_decrement(record.available, request.quantity);
                (result.available, result.applied)
            }
            MovementKind::Increment => {
                let available = record.available.saturating_add(request.quantity);
                (available, available - record.available)
            }
        };
        record.available = available;
        record.updated_at = now;

        let movement = StockMovement {
            id: MovementId::new(),
            stock_record_id: record_id,
            order_id: request.order_id,
            kind: request.kind,
            requested: request.quantity,
            amount: applied,
            available_after: available,
            created_at: now,
        };
        state.movements.push(movement.clone());
        if let Some(key) = key {
            let index = state.movements.len() - 1;
            state.movements_by_key.insert(key, index);
        }

        state.failing(Failure::MovementAckLost(record_id))?;
        Ok(MovementReceipt {
            movement,
            replayed: false,
        })
    }

    async fn find_movement(
        &self,
        order_id: OrderId,
        stock_record_id: StockRecordId,
        kind: MovementKind,
    ) -> Result<Option<StockMovement>> {
        let state = self.state.read().await;
        Ok(state
            .movements_by_key
            .get(&(order_id, stock_record_id, kind))
            .map(|&index| state.movements[index].clone()))
    }

    async fn movements_for_record(&self, id: StockRecordId) -> Result<Vec<StockMovement>> {
        let state = self.state.read().await;
        Ok(state
            .movements
            .iter()
            .filter(|m| m.stock_record_id == id)
            .cloned()
            .collect())
    }

    async fn movements_for_order(&self, order_id: OrderId) -> Result<Vec<StockMovement>> {
        let state = self.state.read().await;
        Ok(state
            .movements
            .iter()
            .filter(|m| m.order_id == Some(order_id))
            .cloned()
            .collect())
    }

    async fn record_status_change(&self, change: &StatusChange) -> Result<()> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&change.order_id)
            .ok_or(StoreError::OrderNotFound(change.order_id))?;

        if order.stored_status() != change.old_status {
            return Err(StoreError::StatusConflict {
                order_id: change.order_id,
                expected: change.old_status,
                actual: order.stored_status(),
            });
        }

        *order = order.clone().with_status(change.new_status);
        state.history.push(change.clone());
        Ok(())
    }

    async fn status_history(&self, order_id: OrderId) -> Result<Vec<StatusChange>> {
        let state = self.state.read().await;
        Ok(state
            .history
            .iter()
            .filter(|c| c.order_id == order_id)
            .cloned()
            .collect())
    }
}
