//! Identifier types shared by every layer of the fulfillment ledger.

pub mod types;

pub use types::{BuyerId, MovementId, OrderId, OrderLineId, StatusChangeId, StockRecordId};
