//! Fulfillment error types.

use common::{OrderId, StockRecordId};
use domain::{OrderStatus, TransitionError, ValidationError, VariantKey};
use ledger_store::StoreError;
use thiserror::Error;

use crate::reservation::PartialFulfillment;

/// Errors that can occur while placing and managing orders.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// The input was rejected before anything was written.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The requested status change is not allowed.
    #[error("Invalid transition: {0}")]
    InvalidTransition(#[from] TransitionError),

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Stock record not found.
    #[error("Stock record not found: {0}")]
    RecordNotFound(StockRecordId),

    /// Looking up the stock record for a variant failed.
    #[error("Stock lookup failed for {key}: {source}")]
    LookupFailed {
        key: VariantKey,
        #[source]
        source: StoreError,
    },

    /// Provisioning a stock record failed after it was confirmed absent.
    #[error("Stock record creation failed for {key}: {source}")]
    CreateFailed {
        key: VariantKey,
        #[source]
        source: StoreError,
    },

    /// The order could not be written; nothing is visible.
    #[error("Failed to persist order {order_id}: {source}")]
    OrderPersistFailed {
        order_id: OrderId,
        #[source]
        source: StoreError,
    },

    /// A line could not be written; the order was rolled back with it.
    ///
    /// Nothing was committed, so a transient failure can be retried by
    /// placing the same cart again.
    #[error("Failed to persist line {position} of order {order_id}: {reason}")]
    LinePersistFailed {
        order_id: OrderId,
        position: u32,
        reason: String,
        transient: bool,
    },

    /// A store operation failed.
    #[error("Persistence failed during {step}: {source}")]
    PersistenceFailed {
        step: &'static str,
        #[source]
        source: StoreError,
    },

    /// The order changed concurrently; re-read and retry.
    #[error("Concurrent modification of order {order_id}")]
    Concurrency { order_id: OrderId },

    /// Restitution was requested for an order that is not cancelled.
    #[error("Order {order_id} is {status}, only cancelled orders can be restituted")]
    NotCancelled {
        order_id: OrderId,
        status: OrderStatus,
    },

    /// Reservations were requested for a cancelled order.
    #[error("Order {0} is cancelled")]
    OrderCancelled(OrderId),

    /// The order was written but some lines could not be reserved.
    #[error(
        "Order {} partially fulfilled: {} reserved, {} outstanding",
        .0.order.id(),
        .0.reserved.len(),
        .0.outstanding.len()
    )]
    PartialFulfillment(Box<PartialFulfillment>),
}

impl FulfillmentError {
    /// Maps a store error raised during `step`, keeping not-found and
    /// conflict cases distinct from generic persistence failures.
    pub(crate) fn store(step: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| match source {
            StoreError::OrderNotFound(id) => FulfillmentError::OrderNotFound(id),
            StoreError::StockRecordNotFound(id) => FulfillmentError::RecordNotFound(id),
            StoreError::StatusConflict { order_id, .. } => {
                FulfillmentError::Concurrency { order_id }
            }
            source => FulfillmentError::PersistenceFailed { step, source },
        }
    }

    /// True when repeating the call may succeed.
    ///
    /// A partial fulfillment is retryable through `resume`.
    pub fn is_retryable(&self) -> bool {
        match self {
            FulfillmentError::Concurrency { .. } | FulfillmentError::PartialFulfillment(_) => true,
            FulfillmentError::LookupFailed { source, .. }
            | FulfillmentError::CreateFailed { source, .. }
            | FulfillmentError::OrderPersistFailed { source, .. }
            | FulfillmentError::PersistenceFailed { source, .. } => source.is_transient(),
            FulfillmentError::LinePersistFailed { transient, .. } => *transient,
            _ => false,
        }
    }

    /// Short machine-readable step name for logs and metrics labels.
    pub fn step(&self) -> &'static str {
        match self {
            FulfillmentError::Validation(_) => "validation",
            FulfillmentError::InvalidTransition(_) => "transition",
            FulfillmentError::OrderNotFound(_) | FulfillmentError::RecordNotFound(_) => {
                "not_found"
            }
            FulfillmentError::LookupFailed { .. } => "lookup",
            FulfillmentError::CreateFailed { .. } => "create",
            FulfillmentError::OrderPersistFailed { .. } => "order_persist",
            FulfillmentError::LinePersistFailed { .. } => "line_persist",
            FulfillmentError::PersistenceFailed { step, .. } => step,
            FulfillmentError::Concurrency { .. } => "concurrency",
            FulfillmentError::NotCancelled { .. } | FulfillmentError::OrderCancelled(_) => {
                "order_state"
            }
            FulfillmentError::PartialFulfillment(_) => "partial_fulfillment",
        }
    }
}

/// Convenience type alias for fulfillment results.
pub type Result<T> = std::result::Result<T, FulfillmentError>;
