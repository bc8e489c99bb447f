//! Domain error types.

use thiserror::Error;

use crate::order::OrderStatus;

/// Input rejected before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// An order needs at least one line.
    #[error("Cart is empty")]
    EmptyCart,

    /// A line asked for zero units.
    #[error("Invalid quantity on line {line}: must be greater than 0")]
    NonPositiveQuantity { line: usize },

    /// A line has a negative unit price.
    #[error("Invalid unit price on line {line}: {cents} cents")]
    NegativePrice { line: usize, cents: i64 },

    /// Two lines of one cart refer to the same variant.
    #[error("Variant {0} appears on more than one line")]
    DuplicateVariant(String),

    /// Product identifier is blank.
    #[error("Product ID is required")]
    EmptyProductId,

    /// A color or size reference is present but blank.
    #[error("Variant ID must not be blank when present")]
    EmptyVariantId,

    /// Discount is malformed.
    #[error("Invalid discount: {0}")]
    InvalidDiscount(String),

    /// A line total or the subtotal does not fit in the money type.
    #[error("Amount out of range on line {line}")]
    AmountOverflow { line: usize },

    /// Order total came out below zero.
    #[error("Order total must not be negative: {cents} cents")]
    NegativeTotal { cents: i64 },

    /// Status change requested without an actor.
    #[error("Actor is required")]
    EmptyActor,

    /// A stock quantity was zero where a positive amount is required.
    #[error("Stock quantity must be greater than 0")]
    NonPositiveStockQuantity,
}

/// Errors from the order status state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The requested status is not reachable from the current one.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// A status string did not name a known status.
    #[error("Unknown order status: {0}")]
    UnknownStatus(String),
}
