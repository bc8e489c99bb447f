//! Maps variant keys to stock records.

use domain::{StockRecord, VariantKey};
use ledger_store::LedgerStore;

use crate::error::{FulfillmentError, Result};

/// Resolves a (product, color, size) key to exactly one stock record.
///
/// Matching is exact: a key without a color only matches a record without
/// a color.
#[derive(Clone)]
pub struct VariantResolver<S: LedgerStore> {
    store: S,
}

impl<S: LedgerStore> VariantResolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the record for `key`, creating it at zero if none exists.
    ///
    /// Concurrent resolutions of the same new key return the same record.
    #[tracing::instrument(skip(self), fields(variant = %key))]
    pub async fn resolve(&self, key: &VariantKey) -> Result<StockRecord> {
        if let Some(record) = self.lookup(key).await? {
            return Ok(record);
        }

        let record = self
            .store
            .create_stock_record(key)
            .await
            .map_err(|source| FulfillmentError::CreateFailed {
                key: key.clone(),
                source,
            })?;

        tracing::info!(stock_record_id = %record.id, "stock record provisioned at zero");
        Ok(record)
    }

    /// Returns the record for `key` without provisioning one.
    pub async fn lookup(&self, key: &VariantKey) -> Result<Option<StockRecord>> {
        self.store
            .find_stock_record(key)
            .await
            .map_err(|source| FulfillmentError::LookupFailed {
                key: key.clone(),
                source,
            })
    }
}
