//! Stock ledger service: the only path that changes an available count.

use std::collections::HashSet;

use common::{OrderId, StockRecordId};
use domain::{
    MovementKind, MovementRequest, StockAudit, StockMovement, StockRecord, ValidationError,
    VariantKey,
};
use ledger_store::{LedgerStore, LedgerStoreExt, MovementReceipt};

use crate::error::{FulfillmentError, Result};
use crate::resolver::VariantResolver;

/// Applies decrements and increments to stock records and reads back the
/// movement log.
#[derive(Clone)]
pub struct StockLedger<S: LedgerStore> {
    store: S,
    resolver: VariantResolver<S>,
}

impl<S: LedgerStore + Clone> StockLedger<S> {
    pub fn new(store: S) -> Self {
        let resolver = VariantResolver::new(store.clone());
        Self { store, resolver }
    }

    /// Takes up to `quantity` units from a record on behalf of an order.
    ///
    /// The count is clamped at zero; the receipt reports what was applied.
    /// Repeating the call for the same order and record returns the first
    /// receipt without decrementing again.
    #[tracing::instrument(skip(self))]
    pub async fn decrement(
        &self,
        stock_record_id: StockRecordId,
        order_id: OrderId,
        quantity: u32,
    ) -> Result<MovementReceipt> {
        let request = MovementRequest::decrement(stock_record_id, order_id, quantity)?;
        let receipt = self
            .store
            .apply_movement(request)
            .await
            .map_err(FulfillmentError::store("decrement"))?;

        if !receipt.replayed {
            let shortfall = receipt.movement.shortfall();
            metrics::counter!("stock_decrements_total").increment(1);
            if shortfall > 0 {
                metrics::counter!("stock_shortfall_units_total").increment(u64::from(shortfall));
                tracing::warn!(
                    requested = quantity,
                    applied = receipt.movement.amount,
                    "decrement clamped at zero"
                );
            }
        }
        tracing::debug!(
            available = receipt.available(),
            replayed = receipt.replayed,
            "decrement applied"
        );

        Ok(receipt)
    }

    /// Returns `quantity` units to a record.
    ///
    /// With an order id the increment is applied at most once per order and
    /// record.
    #[tracing::instrument(skip(self))]
    pub async fn increment(
        &self,
        stock_record_id: StockRecordId,
        order_id: Option<OrderId>,
        quantity: u32,
    ) -> Result<MovementReceipt> {
        let request = MovementRequest::increment(stock_record_id, order_id, quantity)?;
        let receipt = self
            .store
            .apply_movement(request)
            .await
            .map_err(FulfillmentError::store("increment"))?;

        if !receipt.replayed {
            metrics::counter!("stock_increments_total").increment(1);
        }
        tracing::debug!(
            available = receipt.available(),
            replayed = receipt.replayed,
            "increment applied"
        );

        Ok(receipt)
    }

    /// Resolves or creates the record for `key` and stocks it.
    #[tracing::instrument(skip(self), fields(variant = %key))]
    pub async fn provision(&self, key: &VariantKey, quantity: u32) -> Result<MovementReceipt> {
        if quantity == 0 {
            return Err(ValidationError::NonPositiveStockQuantity.into());
        }
        let record = self.resolver.resolve(key).await?;
        let receipt = self.increment(record.id, None, quantity).await?;
        tracing::info!(
            stock_record_id = %record.id,
            available = receipt.available(),
            "stock provisioned"
        );
        Ok(receipt)
    }

    /// Loads a stock record.
    pub async fn record(&self, stock_record_id: StockRecordId) -> Result<StockRecord> {
        self.store
            .get_stock_record(stock_record_id)
            .await
            .map_err(FulfillmentError::store("load_stock_record"))?
            .ok_or(FulfillmentError::RecordNotFound(stock_record_id))
    }

    /// Returns the movement log of a record, oldest first.
    pub async fn movements(&self, stock_record_id: StockRecordId) -> Result<Vec<StockMovement>> {
        self.record(stock_record_id).await?;

        self.store
            .movements_for_record(stock_record_id)
            .await
            .map_err(FulfillmentError::store("load_movements"))
    }

    /// Reconciles a record's count against its movement log.
    #[tracing::instrument(skip(self))]
    pub async fn audit(&self, stock_record_id: StockRecordId) -> Result<StockAudit> {
        let audit = self
            .store
            .audit_stock_record(stock_record_id)
            .await
            .map_err(FulfillmentError::store("audit"))?
            .ok_or(FulfillmentError::RecordNotFound(stock_record_id))?;

        if !audit.is_consistent() {
            tracing::error!(
                available = audit.available,
                movement_total = audit.movement_total,
                "stock record disagrees with its movement log"
            );
        }
        Ok(audit)
    }
}

/// Decrements of an order that no increment has returned yet.
pub(crate) fn unrestituted(movements: &[StockMovement]) -> Vec<&StockMovement> {
    let returned: HashSet<StockRecordId> = movements
        .iter()
        .filter(|m| m.kind == MovementKind::Increment)
        .map(|m| m.stock_record_id)
        .collect();

    movements
        .iter()
        .filter(|m| m.kind == MovementKind::Decrement && m.amount > 0)
        .filter(|m| !returned.contains(&m.stock_record_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_store::{Failure, InMemoryLedgerStore};

    async fn stocked(ledger: &StockLedger<InMemoryLedgerStore>, quantity: u32) -> StockRecordId {
        let key = VariantKey::new("P1", Some("red".into()), Some("M".into())).unwrap();
        ledger.provision(&key, quantity).await.unwrap().movement.stock_record_id
    }

    #[tokio::test]
    async fn test_decrement_within_stock() {
        let ledger = StockLedger::new(InMemoryLedgerStore::new());
        let record = stocked(&ledger, 10).await;

        let receipt = ledger.decrement(record, OrderId::new(), 3).await.unwrap();

        assert_eq!(receipt.available(), 7);
        assert_eq!(receipt.movement.kind, MovementKind::Decrement);
        assert_eq!(receipt.movement.amount, 3);
    }

    #[tokio::test]
    async fn test_decrement_clamps_and_reports_shortfall() {
        let ledger = StockLedger::new(InMemoryLedgerStore::new());
        let record = stocked(&ledger, 2).await;

        let receipt = ledger.decrement(record, OrderId::new(), 3).await.unwrap();

        assert_eq!(receipt.available(), 0);
        assert_eq!(receipt.movement.shortfall(), 1);
    }

    #[tokio::test]
    async fn test_zero_quantity_rejected() {
        let ledger = StockLedger::new(InMemoryLedgerStore::new());
        let record = stocked(&ledger, 2).await;

        let result = ledger.decrement(record, OrderId::new(), 0).await;
        assert!(matches!(result, Err(FulfillmentError::Validation(_))));
    }

    #[tokio::test]
    async fn test_provision_zero_creates_nothing() {
        let store = InMemoryLedgerStore::new();
        let ledger = StockLedger::new(store.clone());
        let key = VariantKey::product("P9").unwrap();

        let result = ledger.provision(&key, 0).await;

        assert!(matches!(result, Err(FulfillmentError::Validation(_))));
        assert!(store.find_stock_record(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_record() {
        let ledger = StockLedger::new(InMemoryLedgerStore::new());

        let result = ledger.decrement(StockRecordId::new(), OrderId::new(), 1).await;
        assert!(matches!(result, Err(FulfillmentError::RecordNotFound(_))));
        assert!(matches!(
            ledger.audit(StockRecordId::new()).await,
            Err(FulfillmentError::RecordNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_store_failure_is_persistence_failed() {
        let store = InMemoryLedgerStore::new();
        let ledger = StockLedger::new(store.clone());
        let record = stocked(&ledger, 5).await;
        store.inject(Failure::Movement(record)).await;

        let result = ledger.decrement(record, OrderId::new(), 1).await;
        assert!(matches!(
            result,
            Err(FulfillmentError::PersistenceFailed { step: "decrement", .. })
        ));
    }

    #[tokio::test]
    async fn test_replay_does_not_double_decrement() {
        let ledger = StockLedger::new(InMemoryLedgerStore::new());
        let record = stocked(&ledger, 10).await;
        let order_id = OrderId::new();

        let first = ledger.decrement(record, order_id, 4).await.unwrap();
        let again = ledger.decrement(record, order_id, 4).await.unwrap();

        assert!(again.replayed);
        assert_eq!(again.movement, first.movement);
        let audit = ledger.audit(record).await.unwrap();
        assert_eq!(audit.available, 6);
        assert_eq!(audit.decremented, 4);
    }

    #[tokio::test]
    async fn test_audit_matches_movements() {
        let ledger = StockLedger::new(InMemoryLedgerStore::new());
        let record = stocked(&ledger, 5).await;
        ledger.decrement(record, OrderId::new(), 3).await.unwrap();
        ledger.decrement(record, OrderId::new(), 3).await.unwrap();
        ledger.increment(record, None, 4).await.unwrap();

        let audit = ledger.audit(record).await.unwrap();
        assert!(audit.is_consistent());
        assert_eq!(audit.available, 4);
        assert_eq!(audit.shortfall, 1);
        assert_eq!(ledger.movements(record).await.unwrap().len(), 4);
    }

    #[test]
    fn test_unrestituted_skips_returned_and_empty_decrements() {
        let order_id = OrderId::new();
        let (a, b, c) = (StockRecordId::new(), StockRecordId::new(), StockRecordId::new());
        let movement = |record, kind, amount| StockMovement {
            id: common::MovementId::new(),
            stock_record_id: record,
            order_id: Some(order_id),
            kind,
            requested: 2,
            amount,
            available_after: 0,
            created_at: chrono::Utc::now(),
        };
        let movements = vec![
            movement(a, MovementKind::Decrement, 2),
            movement(b, MovementKind::Decrement, 0),
            movement(c, MovementKind::Decrement, 1),
            movement(a, MovementKind::Increment, 2),
        ];

        let pending = unrestituted(&movements);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].stock_record_id, c);
    }
}
