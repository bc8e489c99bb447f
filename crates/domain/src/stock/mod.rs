//! Stock records, variant keys and the movement log.

mod movement;
mod record;
mod variant;

pub use movement::{MovementKind, MovementRequest, StockAudit, StockMovement};
pub use record::{Decrement, StockRecord, clamped_decrement};
pub use variant::{ProductId, VariantId, VariantKey};
