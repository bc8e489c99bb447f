//! Domain layer for the order fulfillment ledger.
//!
//! This crate holds the typed entities the rest of the workspace passes
//! around, with constructors that enforce their invariants:
//! - Orders, order lines and the carts they are built from
//! - The order status state machine and its history entries
//! - Stock records, variant keys and the stock movement log

pub mod error;
pub mod order;
pub mod stock;

pub use common::{BuyerId, MovementId, OrderId, OrderLineId, StatusChangeId, StockRecordId};
pub use error::{TransitionError, ValidationError};
pub use order::{
    Actor, Cart, CartLine, Discount, DiscountKind, Money, NewOrder, Order, OrderLine,
    OrderPricing, OrderStatus, StatusChange, TransitionKind,
};
pub use stock::{
    Decrement, MovementKind, MovementRequest, ProductId, StockAudit, StockMovement, StockRecord,
    VariantId, VariantKey, clamped_decrement,
};
