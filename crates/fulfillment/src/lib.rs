//! Order fulfillment services.
//!
//! This crate turns carts into persisted orders and keeps stock in step:
//! - [`VariantResolver`] maps a product variant to its stock record
//! - [`StockLedger`] applies clamped, idempotent stock movements
//! - [`OrderBuilder`] validates carts and writes orders with their lines
//! - [`OrderStatusMachine`] owns the order status lifecycle
//! - [`FulfillmentOrchestrator`] sequences all of the above into "place order"
//!
//! Every service is generic over a [`ledger_store::LedgerStore`].

pub mod builder;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod reservation;
pub mod resolver;
pub mod status;

pub use builder::OrderBuilder;
pub use error::{FulfillmentError, Result};
pub use ledger::StockLedger;
pub use orchestrator::FulfillmentOrchestrator;
pub use reservation::{
    LineProgress, LineReservation, OrderDetails, OutstandingLine, PartialFulfillment,
    PlacedOrder, ProgressState, ReservationProgress, Restitution,
};
pub use resolver::VariantResolver;
pub use status::{OrderStatusMachine, TransitionOutcome};
