use common::{OrderId, StockRecordId};
use domain::OrderStatus;
use thiserror::Error;

/// Errors that can occur when interacting with the ledger store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The stock record does not exist.
    #[error("Stock record not found: {0}")]
    StockRecordNotFound(StockRecordId),

    /// An order with this id was already written.
    #[error("Order already exists: {0}")]
    DuplicateOrder(OrderId),

    /// The order's status changed between read and write.
    #[error(
        "Status conflict for order {order_id}: expected {expected:?}, found {actual:?}"
    )]
    StatusConflict {
        order_id: OrderId,
        expected: Option<OrderStatus>,
        actual: Option<OrderStatus>,
    },

    /// Writing an order line failed; the whole order was rolled back.
    ///
    /// `transient` is set when the underlying failure was a lost or
    /// exhausted connection rather than a rejected row.
    #[error("Failed to write line {position} of order {order_id}: {reason}")]
    LineInsert {
        order_id: OrderId,
        position: u32,
        reason: String,
        transient: bool,
    },

    /// A stored row does not satisfy the entity invariants.
    #[error("Invalid row in {table}: {reason}")]
    InvalidRow { table: &'static str, reason: String },

    /// The backing store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub(crate) fn invalid_row(table: &'static str, reason: impl ToString) -> Self {
        StoreError::InvalidRow {
            table,
            reason: reason.to_string(),
        }
    }

    /// True for failures where retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::StatusConflict { .. } | StoreError::Unavailable(_) => true,
            StoreError::LineInsert { transient, .. } => *transient,
            StoreError::Database(err) => is_transient_sqlx(err),
            _ => false,
        }
    }
}

/// Connection-level sqlx failures that a retry may get past.
pub(crate) fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed
    )
}

/// Result type for ledger store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
