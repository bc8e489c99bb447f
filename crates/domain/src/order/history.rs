//! Status history entries.

use chrono::{DateTime, Utc};
use common::{OrderId, StatusChangeId};
use serde::{Deserialize, Serialize};

use super::{Actor, OrderStatus};

/// One immutable entry in an order's status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub id: StatusChangeId,
    pub order_id: OrderId,
    /// Status as stored before the change; `None` for legacy orders.
    pub old_status: Option<OrderStatus>,
    pub new_status: OrderStatus,
    pub actor: Actor,
    pub changed_at: DateTime<Utc>,
}

impl StatusChange {
    pub fn new(
        order_id: OrderId,
        old_status: Option<OrderStatus>,
        new_status: OrderStatus,
        actor: Actor,
    ) -> Self {
        Self {
            id: StatusChangeId::new(),
            order_id,
            old_status,
            new_status,
            actor,
            changed_at: Utc::now(),
        }
    }

    /// True when the entry records a repeated request for the same status.
    pub fn is_noop(&self) -> bool {
        OrderStatus::effective(self.old_status) == self.new_status
    }
}
