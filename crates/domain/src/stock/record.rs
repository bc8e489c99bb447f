//! Availability counter for one variant.

use chrono::{DateTime, Utc};
use common::StockRecordId;
use serde::{Deserialize, Serialize};

use super::VariantKey;

/// The availability counter for one variant.
///
/// Records start at zero and only change through movements, so `available`
/// always equals the signed sum of the record's movement log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub id: StockRecordId,
    pub key: VariantKey,
    pub available: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StockRecord {
    /// A freshly provisioned, unsellable record.
    pub fn empty(key: VariantKey) -> Self {
        let now = Utc::now();
        Self {
            id: StockRecordId::new(),
            key,
            available: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Result of clamping a decrement against an available count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decrement {
    /// Count after the decrement.
    pub available: u32,
    /// Units actually taken; less than requested when stock ran out.
    pub applied: u32,
}

/// `available = max(0, available - requested)`.
pub fn clamped_decrement(available: u32, requested: u32) -> Decrement {
    let applied = requested.min(available);
    Decrement {
        available: available - applied,
        applied,
    }
}
