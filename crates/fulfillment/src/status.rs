//! Order status lifecycle service.

use common::OrderId;
use domain::{Actor, Order, OrderStatus, StatusChange, TransitionKind};
use ledger_store::LedgerStore;
use serde::Serialize;

use crate::error::{FulfillmentError, Result};
use crate::ledger::unrestituted;

/// Result of an accepted status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionOutcome {
    /// The order as it stands after the transition.
    pub order: Order,
    pub previous: OrderStatus,
    pub kind: TransitionKind,
    /// The history entry written, or `None` for an unrecorded no-op.
    pub change: Option<StatusChange>,
    /// The order was cancelled with stock still taken; see `restitute`.
    pub restitution_pending: bool,
}

/// The only writer of order status.
///
/// Allowed moves: forward along pending, processing, shipped, completed
/// (skipping is allowed), or any non-terminal status to cancelled.
#[derive(Clone)]
pub struct OrderStatusMachine<S: LedgerStore> {
    store: S,
    record_noops: bool,
}

impl<S: LedgerStore> OrderStatusMachine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            record_noops: true,
        }
    }

    /// Whether repeated requests for the current status get a history entry.
    pub fn with_noop_recording(mut self, record_noops: bool) -> Self {
        self.record_noops = record_noops;
        self
    }

    /// Moves an order to `requested` on behalf of `actor`.
    ///
    /// The status write and its history entry commit together, and only if
    /// the stored status is still the one read here; otherwise the call
    /// fails with `Concurrency` and can be retried.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.as_str()))]
    pub async fn transition(
        &self,
        order_id: OrderId,
        requested: OrderStatus,
        actor: &Actor,
    ) -> Result<TransitionOutcome> {
        let order = self
            .store
            .get_order(order_id)
            .await
            .map_err(FulfillmentError::store("load_order"))?
            .ok_or(FulfillmentError::OrderNotFound(order_id))?;
        let previous = order.status();

        let kind = previous.transition_to(requested).inspect_err(|e| {
            metrics::counter!("invalid_transitions_total").increment(1);
            tracing::warn!(error = %e, "transition rejected");
        })?;

        if kind == TransitionKind::NoOp && !self.record_noops {
            return Ok(TransitionOutcome {
                order,
                previous,
                kind,
                change: None,
                restitution_pending: false,
            });
        }

        let change = StatusChange::new(order_id, order.stored_status(), requested, actor.clone());
        self.store
            .record_status_change(&change)
            .await
            .map_err(FulfillmentError::store("record_status_change"))?;

        metrics::counter!("status_transitions_total", "to" => requested.as_str()).increment(1);
        tracing::info!(from = %previous, to = %requested, "order status changed");

        let restitution_pending = if kind == TransitionKind::Cancel {
            self.has_unrestituted_stock(order_id).await?
        } else {
            false
        };
        if restitution_pending {
            tracing::warn!("order cancelled with stock still decremented; restitution pending");
        }

        Ok(TransitionOutcome {
            order: order.with_status(requested),
            previous,
            kind,
            change: Some(change),
            restitution_pending,
        })
    }

    /// Returns the status history of an order, oldest first.
    pub async fn history(&self, order_id: OrderId) -> Result<Vec<StatusChange>> {
        self.store
            .get_order(order_id)
            .await
            .map_err(FulfillmentError::store("load_order"))?
            .ok_or(FulfillmentError::OrderNotFound(order_id))?;

        self.store
            .status_history(order_id)
            .await
            .map_err(FulfillmentError::store("load_history"))
    }

    async fn has_unrestituted_stock(&self, order_id: OrderId) -> Result<bool> {
        let movements = self
            .store
            .movements_for_order(order_id)
            .await
            .map_err(FulfillmentError::store("load_movements"))?;
        Ok(!unrestituted(&movements).is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::BuyerId;
    use domain::{Cart, CartLine, Money, TransitionError, VariantKey};
    use ledger_store::InMemoryLedgerStore;

    async fn setup() -> (OrderStatusMachine<InMemoryLedgerStore>, InMemoryLedgerStore, OrderId) {
        let store = InMemoryLedgerStore::new();
        let new_order = Cart::new()
            .with_line(CartLine::new(
                VariantKey::product("P1").unwrap(),
                1,
                Money::from_cents(100),
            ))
            .build(BuyerId::new())
            .unwrap();
        store.insert_order(&new_order).await.unwrap();
        (
            OrderStatusMachine::new(store.clone()),
            store,
            new_order.order.id(),
        )
    }

    fn ops() -> Actor {
        Actor::new("ops@example.com").unwrap()
    }

    #[tokio::test]
    async fn test_forward_transitions_are_recorded() {
        let (machine, _, order_id) = setup().await;

        machine
            .transition(order_id, OrderStatus::Processing, &ops())
            .await
            .unwrap();
        let outcome = machine
            .transition(order_id, OrderStatus::Completed, &ops())
            .await
            .unwrap();

        assert_eq!(outcome.previous, OrderStatus::Processing);
        assert_eq!(outcome.kind, TransitionKind::Advance);
        assert_eq!(outcome.order.status(), OrderStatus::Completed);

        let history = machine.history(order_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].old_status, Some(OrderStatus::Pending));
        assert_eq!(history[1].new_status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn test_pending_to_cancelled() {
        let (machine, _, order_id) = setup().await;

        let outcome = machine
            .transition(order_id, OrderStatus::Cancelled, &ops())
            .await
            .unwrap();

        assert_eq!(outcome.kind, TransitionKind::Cancel);
        assert!(!outcome.restitution_pending);
    }

    #[tokio::test]
    async fn test_backward_transition_rejected_without_write() {
        let (machine, store, order_id) = setup().await;
        machine
            .transition(order_id, OrderStatus::Shipped, &ops())
            .await
            .unwrap();

        let result = machine
            .transition(order_id, OrderStatus::Processing, &ops())
            .await;

        assert!(matches!(
            result,
            Err(FulfillmentError::InvalidTransition(
                TransitionError::InvalidTransition {
                    from: OrderStatus::Shipped,
                    to: OrderStatus::Processing
                }
            ))
        ));
        let order = store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status(), OrderStatus::Shipped);
        assert_eq!(machine.history(order_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_states_reject_everything_else() {
        let (machine, _, order_id) = setup().await;
        machine
            .transition(order_id, OrderStatus::Completed, &ops())
            .await
            .unwrap();

        for status in [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Cancelled,
        ] {
            let result = machine.transition(order_id, status, &ops()).await;
            assert!(matches!(result, Err(FulfillmentError::InvalidTransition(_))));
        }
    }

    #[tokio::test]
    async fn test_noop_recorded_by_default() {
        let (machine, _, order_id) = setup().await;

        let outcome = machine
            .transition(order_id, OrderStatus::Pending, &ops())
            .await
            .unwrap();

        assert_eq!(outcome.kind, TransitionKind::NoOp);
        assert!(outcome.change.is_some_and(|c| c.is_noop()));
        assert_eq!(machine.history(order_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_noop_not_recorded_when_disabled() {
        let (machine, _, order_id) = setup().await;
        let machine = machine.with_noop_recording(false);

        let outcome = machine
            .transition(order_id, OrderStatus::Pending, &ops())
            .await
            .unwrap();

        assert!(outcome.change.is_none());
        assert!(machine.history(order_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let (machine, _, _) = setup().await;

        let result = machine
            .transition(OrderId::new(), OrderStatus::Shipped, &ops())
            .await;
        assert!(matches!(result, Err(FulfillmentError::OrderNotFound(_))));
        assert!(matches!(
            machine.history(OrderId::new()).await,
            Err(FulfillmentError::OrderNotFound(_))
        ));
    }
}
