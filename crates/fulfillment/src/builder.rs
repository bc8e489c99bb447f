//! Turns a validated cart into a persisted order.

use common::BuyerId;
use domain::{Cart, NewOrder};
use ledger_store::{LedgerStore, StoreError};

use crate::error::{FulfillmentError, Result};

/// Validates carts and writes the resulting order with its lines.
#[derive(Clone)]
pub struct OrderBuilder<S: LedgerStore> {
    store: S,
}

impl<S: LedgerStore> OrderBuilder<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Creates an order for `buyer_id` from `cart`.
    ///
    /// Validation happens before any write. The order and all of its lines
    /// are written in one transaction, so a failure leaves nothing behind.
    #[tracing::instrument(skip(self, cart), fields(lines = cart.lines.len()))]
    pub async fn create_order(&self, buyer_id: BuyerId, cart: &Cart) -> Result<NewOrder> {
        let new_order = cart.build(buyer_id)?;
        let order_id = new_order.order.id();

        self.store
            .insert_order(&new_order)
            .await
            .map_err(|source| match source {
                StoreError::LineInsert {
                    order_id,
                    position,
                    reason,
                    transient,
                } => FulfillmentError::LinePersistFailed {
                    order_id,
                    position,
                    reason,
                    transient,
                },
                source => FulfillmentError::OrderPersistFailed { order_id, source },
            })?;

        tracing::info!(
            %order_id,
            total = %new_order.order.total(),
            "order created"
        );
        Ok(new_order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{CartLine, Discount, Money, OrderStatus, ValidationError, VariantKey};
    use ledger_store::{Failure, InMemoryLedgerStore, LedgerStoreExt};

    fn line(product: &str, quantity: u32, cents: i64) -> CartLine {
        CartLine::new(
            VariantKey::product(product).unwrap(),
            quantity,
            Money::from_cents(cents),
        )
    }

    #[tokio::test]
    async fn test_create_order_persists_order_and_lines() {
        let store = InMemoryLedgerStore::new();
        let builder = OrderBuilder::new(store.clone());
        let cart = Cart::new()
            .with_line(line("P1", 2, 1000))
            .with_line(line("P2", 1, 500))
            .with_discount(Discount::Fixed(Money::from_cents(300)))
            .with_points(Some(25), Some(10))
            .with_shipping_address("1 Main St");

        let created = builder.create_order(BuyerId::new(), &cart).await.unwrap();

        let (order, lines) = store
            .get_order_with_lines(created.order.id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.pricing().subtotal, Money::from_cents(2500));
        assert_eq!(order.total(), Money::from_cents(2200));
        assert_eq!(order.pricing().points_spent, Some(10));
        assert_eq!(order.stored_status(), Some(OrderStatus::Pending));
        assert_eq!(lines.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_cart_writes_nothing() {
        let store = InMemoryLedgerStore::new();
        let builder = OrderBuilder::new(store.clone());

        let result = builder.create_order(BuyerId::new(), &Cart::new()).await;

        assert!(matches!(
            result,
            Err(FulfillmentError::Validation(ValidationError::EmptyCart))
        ));
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_zero_quantity_rejected() {
        let builder = OrderBuilder::new(InMemoryLedgerStore::new());
        let cart = Cart::new().with_line(line("P1", 0, 1000));

        let result = builder.create_order(BuyerId::new(), &cart).await;
        assert!(matches!(
            result,
            Err(FulfillmentError::Validation(
                ValidationError::NonPositiveQuantity { .. }
            ))
        ));
    }

    #[tokio::test]
    async fn test_line_failure_rolls_back_order() {
        let store = InMemoryLedgerStore::new();
        store.inject(Failure::LineInsert).await;
        let builder = OrderBuilder::new(store.clone());
        let cart = Cart::new().with_line(line("P1", 1, 1000));

        let result = builder.create_order(BuyerId::new(), &cart).await;

        assert!(matches!(
            result,
            Err(FulfillmentError::LinePersistFailed { .. })
        ));
        assert_eq!(store.order_count().await, 0);
    }
}
