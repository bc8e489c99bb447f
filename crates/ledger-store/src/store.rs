use async_trait::async_trait;
use common::{OrderId, StockRecordId};
use domain::{
    MovementKind, MovementRequest, NewOrder, Order, OrderLine, StatusChange, StockAudit,
    StockMovement, StockRecord, VariantKey,
};

use crate::{OrderQuery, Result};

/// Outcome of applying a movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementReceipt {
    /// The movement as recorded in the log.
    pub movement: StockMovement,

    /// True when the movement had already been applied and this call
    /// returned the original entry without touching the count.
    pub replayed: bool,
}

impl MovementReceipt {
    /// Count of the record right after the movement was applied.
    pub fn available(&self) -> u32 {
        self.movement.available_after
    }
}

/// Core trait for ledger store implementations.
///
/// All implementations must be thread-safe (Send + Sync) and are shared by
/// every concurrent fulfillment request.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Writes an order and all of its lines atomically.
    ///
    /// Fails with `LineInsert` if a line cannot be written, in which case the
    /// order row is not visible either.
    async fn insert_order(&self, new_order: &NewOrder) -> Result<()>;

    /// Retrieves an order by id.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Retrieves the lines of an order, in position order.
    async fn get_order_lines(&self, order_id: OrderId) -> Result<Vec<OrderLine>>;

    /// Lists orders matching a query, newest first.
    async fn query_orders(&self, query: OrderQuery) -> Result<Vec<Order>>;

    /// Looks up the stock record for an exact variant key.
    async fn find_stock_record(&self, key: &VariantKey) -> Result<Option<StockRecord>>;

    /// Retrieves a stock record by id.
    async fn get_stock_record(&self, id: StockRecordId) -> Result<Option<StockRecord>>;

    /// Creates a zero-count stock record for `key`.
    ///
    /// If a concurrent caller created the record first, that record is
    /// returned instead; there is never more than one record per key.
    async fn create_stock_record(&self, key: &VariantKey) -> Result<StockRecord>;

    /// Applies a movement and appends it to the log in one atomic step.
    ///
    /// Decrements compute `max(0, available - quantity)` against the stored
    /// count at execution time. A request carrying an order id that was
    /// already applied returns the original movement with `replayed` set.
    async fn apply_movement(&self, request: MovementRequest) -> Result<MovementReceipt>;

    /// Finds the movement an order applied to a record, if any.
    async fn find_movement(
        &self,
        order_id: OrderId,
        stock_record_id: StockRecordId,
        kind: MovementKind,
    ) -> Result<Option<StockMovement>>;

    /// Retrieves the movement log of a record, oldest first.
    async fn movements_for_record(&self, id: StockRecordId) -> Result<Vec<StockMovement>>;

    /// Retrieves every movement attributed to an order, oldest first.
    async fn movements_for_order(&self, order_id: OrderId) -> Result<Vec<StockMovement>>;

    /// Writes `change.new_status` and appends `change` to the history.
    ///
    /// The write only happens if the stored status still equals
    /// `change.old_status`; otherwise `StatusConflict` is returned and
    /// nothing is written.
    async fn record_status_change(&self, change: &StatusChange) -> Result<()>;

    /// Retrieves the status history of an order, oldest first.
    async fn status_history(&self, order_id: OrderId) -> Result<Vec<StatusChange>>;
}

/// Extension trait providing convenience methods for ledger stores.
#[async_trait]
pub trait LedgerStoreExt: LedgerStore {
    /// Loads an order together with its lines.
    async fn get_order_with_lines(
        &self,
        order_id: OrderId,
    ) -> Result<Option<(Order, Vec<OrderLine>)>> {
        match self.get_order(order_id).await? {
            Some(order) => {
                let lines = self.get_order_lines(order_id).await?;
                Ok(Some((order, lines)))
            }
            None => Ok(None),
        }
    }

    /// Reconciles a record against its movement log.
    async fn audit_stock_record(&self, id: StockRecordId) -> Result<Option<StockAudit>> {
        let Some(record) = self.get_stock_record(id).await? else {
            return Ok(None);
        };
        let movements = self.movements_for_record(id).await?;
        Ok(Some(StockAudit::new(&record, &movements)))
    }
}

// Blanket implementation for all LedgerStore implementations
impl<T: LedgerStore + ?Sized> LedgerStoreExt for T {}
