//! Outcomes of reserving stock for an order.

use common::{OrderId, OrderLineId, StockRecordId};
use domain::{Actor, Order, OrderLine, StockMovement, VariantKey};
use ledger_store::MovementReceipt;
use serde::Serialize;

/// Stock taken for one order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineReservation {
    pub line_id: OrderLineId,
    pub position: u32,
    pub stock_record_id: StockRecordId,
    pub requested: u32,
    pub applied: u32,
    pub available_after: u32,
    /// The decrement had already been applied by an earlier attempt.
    pub replayed: bool,
}

impl LineReservation {
    pub(crate) fn new(line: &OrderLine, receipt: &MovementReceipt) -> Self {
        Self::from_movement(line, &receipt.movement, receipt.replayed)
    }

    pub(crate) fn from_movement(line: &OrderLine, movement: &StockMovement, replayed: bool) -> Self {
        Self {
            line_id: line.id(),
            position: line.position(),
            stock_record_id: movement.stock_record_id,
            requested: movement.requested,
            applied: movement.amount,
            available_after: movement.available_after,
            replayed,
        }
    }

    /// Units the line asked for that were not in stock.
    pub fn shortfall(&self) -> u32 {
        self.requested - self.applied
    }
}

/// An order line whose decrement did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutstandingLine {
    pub line_id: OrderLineId,
    pub position: u32,
    pub variant: VariantKey,
    pub quantity: u32,
    /// The step that failed.
    pub step: &'static str,
    pub reason: String,
}

impl OutstandingLine {
    pub(crate) fn new(line: &OrderLine, step: &'static str, reason: impl ToString) -> Self {
        Self {
            line_id: line.id(),
            position: line.position(),
            variant: line.variant().clone(),
            quantity: line.quantity(),
            step,
            reason: reason.to_string(),
        }
    }
}

/// An order that was persisted with one or more lines left unreserved.
///
/// Retrying through `resume` only touches the outstanding lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialFulfillment {
    pub order: Order,
    pub reserved: Vec<LineReservation>,
    pub outstanding: Vec<OutstandingLine>,
}

/// An order whose every line has been reserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlacedOrder {
    pub order: Order,
    pub lines: Vec<OrderLine>,
    pub reservations: Vec<LineReservation>,
}

impl PlacedOrder {
    /// Total units requested but not available, across all lines.
    pub fn shortfall(&self) -> u32 {
        self.reservations.iter().map(LineReservation::shortfall).sum()
    }

    /// True when any line was clamped by missing stock.
    pub fn is_short(&self) -> bool {
        self.shortfall() > 0
    }
}

/// An order with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderDetails {
    pub order: Order,
    pub lines: Vec<OrderLine>,
}

/// Overall reservation state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressState {
    FullyReserved,
    Partial,
}

/// Reservation state of one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineProgress {
    pub line_id: OrderLineId,
    pub position: u32,
    pub variant: VariantKey,
    pub quantity: u32,
    /// `None` when the variant has never been resolved.
    pub stock_record_id: Option<StockRecordId>,
    /// The decrement applied for this line, if any.
    pub movement: Option<StockMovement>,
}

impl LineProgress {
    pub fn is_reserved(&self) -> bool {
        self.movement.is_some()
    }
}

/// Reservation progress of an order, line by line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservationProgress {
    pub order_id: OrderId,
    pub state: ProgressState,
    pub lines: Vec<LineProgress>,
}

impl ReservationProgress {
    pub(crate) fn new(order_id: OrderId, lines: Vec<LineProgress>) -> Self {
        let state = if lines.iter().all(LineProgress::is_reserved) {
            ProgressState::FullyReserved
        } else {
            ProgressState::Partial
        };
        Self {
            order_id,
            state,
            lines,
        }
    }

    pub fn is_fully_reserved(&self) -> bool {
        self.state == ProgressState::FullyReserved
    }

    pub fn reserved_count(&self) -> usize {
        self.lines.iter().filter(|l| l.is_reserved()).count()
    }

    pub fn outstanding_count(&self) -> usize {
        self.lines.len() - self.reserved_count()
    }
}

/// Stock returned to the ledger for a cancelled order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Restitution {
    pub order_id: OrderId,
    /// Who asked for the stock back.
    pub actor: Actor,
    /// One increment per record the order decremented.
    pub movements: Vec<StockMovement>,
    /// Units returned by this call, excluding increments already applied.
    pub units_restored: u64,
}
