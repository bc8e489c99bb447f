//! HTTP route handlers.

pub mod observability;
pub mod orders;
pub mod stock;

use std::str::FromStr;

use fulfillment::FulfillmentOrchestrator;
use ledger_store::LedgerStore;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: LedgerStore> {
    pub orchestrator: FulfillmentOrchestrator<S>,
    /// Backend name reported by the health check.
    pub store_kind: &'static str,
}

/// Parses a path or body identifier, naming the field on failure.
pub(crate) fn parse_id<T>(field: &str, value: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {field}: {e}")))
}
