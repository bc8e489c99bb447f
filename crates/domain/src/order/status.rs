//! Order status state machine.

use serde::{Deserialize, Serialize};

use crate::error::TransitionError;

/// The lifecycle status of an order.
///
/// State transitions:
/// ```text
/// Pending ──► Processing ──► Shipped ──► Completed
///    │            │             │
///    └────────────┴─────────────┴──► Cancelled
/// ```
///
/// Orders persisted before status tracking carry no status at all; those are
/// treated as `Processing`, see [`OrderStatus::effective`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order placed, not yet picked up by an operator.
    Pending,

    /// Order is being prepared.
    Processing,

    /// Order has left the warehouse.
    Shipped,

    /// Order was delivered (terminal state).
    Completed,

    /// Order was cancelled (terminal state).
    Cancelled,
}

/// How an accepted transition relates to the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// The requested status equals the current one.
    NoOp,
    /// Forward movement along the fulfillment sequence.
    Advance,
    /// A non-terminal order moved to `Cancelled`.
    Cancel,
}

impl OrderStatus {
    /// Resolves a possibly-unset stored status.
    pub fn effective(stored: Option<OrderStatus>) -> OrderStatus {
        stored.unwrap_or(OrderStatus::Processing)
    }

    /// Position along the fulfillment sequence. `Cancelled` sits outside it.
    fn rank(&self) -> Option<u8> {
        match self {
            OrderStatus::Pending => Some(0),
            OrderStatus::Processing => Some(1),
            OrderStatus::Shipped => Some(2),
            OrderStatus::Completed => Some(3),
            OrderStatus::Cancelled => None,
        }
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Returns true if the order can be cancelled in this state.
    pub fn can_cancel(&self) -> bool {
        !self.is_terminal()
    }

    /// Checks whether moving from `self` to `next` is allowed.
    ///
    /// Requesting the current status is accepted as a no-op, even for
    /// terminal states.
    pub fn transition_to(&self, next: OrderStatus) -> Result<TransitionKind, TransitionError> {
        if *self == next {
            return Ok(TransitionKind::NoOp);
        }
        if next == OrderStatus::Cancelled && self.can_cancel() {
            return Ok(TransitionKind::Cancel);
        }
        match (self.rank(), next.rank()) {
            (Some(from), Some(to)) if !self.is_terminal() && to > from => {
                Ok(TransitionKind::Advance)
            }
            _ => Err(TransitionError::InvalidTransition {
                from: *self,
                to: next,
            }),
        }
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// All statuses in lifecycle order.
    pub fn all() -> [OrderStatus; 5] {
        [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
        ]
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::all()
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| TransitionError::UnknownStatus(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_status_is_processing() {
        assert_eq!(OrderStatus::effective(None), OrderStatus::Processing);
        assert_eq!(
            OrderStatus::effective(Some(OrderStatus::Shipped)),
            OrderStatus::Shipped
        );
    }

    #[test]
    fn test_forward_transitions() {
        use OrderStatus::*;
        assert_eq!(Pending.transition_to(Processing), Ok(TransitionKind::Advance));
        assert_eq!(Processing.transition_to(Shipped), Ok(TransitionKind::Advance));
        assert_eq!(Shipped.transition_to(Completed), Ok(TransitionKind::Advance));
        assert_eq!(Pending.transition_to(Shipped), Ok(TransitionKind::Advance));
    }

    #[test]
    fn test_backward_transitions_rejected() {
        use OrderStatus::*;
        assert!(Shipped.transition_to(Processing).is_err());
        assert!(Processing.transition_to(Pending).is_err());
    }

    #[test]
    fn test_completed_is_final() {
        use OrderStatus::*;
        for next in [Pending, Processing, Shipped, Cancelled] {
            assert_eq!(
                Completed.transition_to(next),
                Err(TransitionError::InvalidTransition {
                    from: Completed,
                    to: next
                })
            );
        }
    }

    #[test]
    fn test_cancelled_is_final() {
        use OrderStatus::*;
        for next in [Pending, Processing, Shipped, Completed] {
            assert!(Cancelled.transition_to(next).is_err());
        }
    }

    #[test]
    fn test_cancel_from_non_terminal_states() {
        use OrderStatus::*;
        for from in [Pending, Processing, Shipped] {
            assert_eq!(from.transition_to(Cancelled), Ok(TransitionKind::Cancel));
        }
    }

    #[test]
    fn test_same_status_is_noop() {
        for status in OrderStatus::all() {
            assert_eq!(status.transition_to(status), Ok(TransitionKind::NoOp));
        }
    }

    #[test]
    fn test_parse_roundtrip() {
        for status in OrderStatus::all() {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }
        assert!("lost".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&OrderStatus::Shipped).unwrap();
        assert_eq!(json, "\"shipped\"");
    }
}
