//! Persistence layer for the order fulfillment ledger.
//!
//! [`LedgerStore`] is the contract the services rely on. Both
//! implementations provide the same guarantees:
//! - an order and its lines become visible together or not at all
//! - a stock movement and its count update commit together
//! - movements tied to an order are idempotent per order, record and kind
//! - status writes are conditional on the status the caller read

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{Failure, InMemoryLedgerStore};
pub use postgres::PostgresLedgerStore;
pub use query::OrderQuery;
pub use store::{LedgerStore, LedgerStoreExt, MovementReceipt};
