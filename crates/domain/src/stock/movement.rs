//! Append-only stock movement log entries.

use chrono::{DateTime, Utc};
use common::{MovementId, OrderId, StockRecordId};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

use super::StockRecord;

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Stock taken by an order.
    Decrement,
    /// Stock added by a restock or returned by a restitution.
    Increment,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Decrement => "decrement",
            MovementKind::Increment => "increment",
        }
    }
}

impl std::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MovementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "decrement" => Ok(MovementKind::Decrement),
            "increment" => Ok(MovementKind::Increment),
            other => Err(format!("unknown movement kind '{other}'")),
        }
    }
}

/// A request to move stock on one record.
///
/// When `order_id` is set the movement is idempotent per
/// `(order_id, stock_record_id, kind)`: applying it twice yields the first
/// receipt and leaves the count untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementRequest {
    pub stock_record_id: StockRecordId,
    pub order_id: Option<OrderId>,
    pub kind: MovementKind,
    pub quantity: u32,
}

impl MovementRequest {
    pub fn decrement(
        stock_record_id: StockRecordId,
        order_id: OrderId,
        quantity: u32,
    ) -> Result<Self, ValidationError> {
        Self::new(stock_record_id, Some(order_id), MovementKind::Decrement, quantity)
    }

    pub fn increment(
        stock_record_id: StockRecordId,
        order_id: Option<OrderId>,
        quantity: u32,
    ) -> Result<Self, ValidationError> {
        Self::new(stock_record_id, order_id, MovementKind::Increment, quantity)
    }

    fn new(
        stock_record_id: StockRecordId,
        order_id: Option<OrderId>,
        kind: MovementKind,
        quantity: u32,
    ) -> Result<Self, ValidationError> {
        if quantity == 0 {
            return Err(ValidationError::NonPositiveStockQuantity);
        }
        Ok(Self {
            stock_record_id,
            order_id,
            kind,
            quantity,
        })
    }
}

/// One immutable entry in the stock ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub stock_record_id: StockRecordId,
    pub order_id: Option<OrderId>,
    pub kind: MovementKind,
    /// Units the caller asked for.
    pub requested: u32,
    /// Units actually applied to the record.
    pub amount: u32,
    /// Record count right after this movement.
    pub available_after: u32,
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    /// Applied amount with its sign: negative for decrements.
    pub fn signed_amount(&self) -> i64 {
        match self.kind {
            MovementKind::Decrement => -i64::from(self.amount),
            MovementKind::Increment => i64::from(self.amount),
        }
    }

    /// Units requested but not applied because stock ran out.
    pub fn shortfall(&self) -> u32 {
        self.requested - self.amount
    }
}

/// Reconciliation of a record against its movement log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAudit {
    pub stock_record_id: StockRecordId,
    pub available: u32,
    pub movement_count: usize,
    pub movement_total: i64,
    pub decremented: u64,
    pub incremented: u64,
    pub shortfall: u64,
}

impl StockAudit {
    pub fn new(record: &StockRecord, movements: &[StockMovement]) -> Self {
        let sum_of = |kind: MovementKind| {
            movements
                .iter()
                .filter(|m| m.kind == kind)
                .map(|m| u64::from(m.amount))
                .sum::<u64>()
        };
        Self {
            stock_record_id: record.id,
            available: record.available,
            movement_count: movements.len(),
            movement_total: movements.iter().map(StockMovement::signed_amount).sum(),
            decremented: sum_of(MovementKind::Decrement),
            incremented: sum_of(MovementKind::Increment),
            shortfall: movements.iter().map(|m| u64::from(m.shortfall())).sum(),
        }
    }

    /// True when the log accounts for every unit of the current count.
    pub fn is_consistent(&self) -> bool {
        self.movement_total == i64::from(self.available)
    }
}
