//! Stock provisioning and ledger inspection endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::StockRecordId;
use domain::{MovementKind, StockAudit, StockMovement, StockRecord, VariantKey};
use ledger_store::LedgerStore;
use serde::{Deserialize, Serialize};

use super::{AppState, parse_id};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct ProvisionRequest {
    pub product_id: String,
    pub color_id: Option<String>,
    pub size_id: Option<String>,
    pub quantity: u32,
}

// -- Response types --

#[derive(Serialize)]
pub struct StockRecordResponse {
    pub id: String,
    pub product_id: String,
    pub color_id: Option<String>,
    pub size_id: Option<String>,
    pub available: u32,
    pub updated_at: DateTime<Utc>,
}

impl From<&StockRecord> for StockRecordResponse {
    fn from(record: &StockRecord) -> Self {
        Self {
            id: record.id.to_string(),
            product_id: record.key.product_id().to_string(),
            color_id: record.key.color_id().map(ToString::to_string),
            size_id: record.key.size_id().map(ToString::to_string),
            available: record.available,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct MovementResponse {
    pub id: String,
    pub stock_record_id: String,
    pub order_id: Option<String>,
    pub kind: MovementKind,
    pub requested: u32,
    pub amount: u32,
    pub available_after: u32,
    pub created_at: DateTime<Utc>,
}

impl From<&StockMovement> for MovementResponse {
    fn from(m: &StockMovement) -> Self {
        Self {
            id: m.id.to_string(),
            stock_record_id: m.stock_record_id.to_string(),
            order_id: m.order_id.map(|id| id.to_string()),
            kind: m.kind,
            requested: m.requested,
            amount: m.amount,
            available_after: m.available_after,
            created_at: m.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct ProvisionResponse {
    pub stock_record_id: String,
    pub available: u32,
    pub movement: MovementResponse,
}

#[derive(Serialize)]
pub struct AuditResponse {
    pub stock_record_id: String,
    pub available: u32,
    pub movement_count: usize,
    pub movement_total: i64,
    pub decremented: u64,
    pub incremented: u64,
    pub shortfall: u64,
    pub consistent: bool,
}

impl From<&StockAudit> for AuditResponse {
    fn from(audit: &StockAudit) -> Self {
        Self {
            stock_record_id: audit.stock_record_id.to_string(),
            available: audit.available,
            movement_count: audit.movement_count,
            movement_total: audit.movement_total,
            decremented: audit.decremented,
            incremented: audit.incremented,
            shortfall: audit.shortfall,
            consistent: audit.is_consistent(),
        }
    }
}

// -- Handlers --

/// POST /stock: add units to a variant, creating its record if needed.
#[tracing::instrument(skip(state, req), fields(product_id = %req.product_id, quantity = req.quantity))]
pub async fn provision<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<ProvisionRequest>,
) -> Result<(StatusCode, Json<ProvisionResponse>), ApiError> {
    let key = VariantKey::new(
        req.product_id,
        req.color_id.map(Into::into),
        req.size_id.map(Into::into),
    )?;

    let receipt = state
        .orchestrator
        .ledger()
        .provision(&key, req.quantity)
        .await?;

    let response = ProvisionResponse {
        stock_record_id: receipt.movement.stock_record_id.to_string(),
        available: receipt.available(),
        movement: MovementResponse::from(&receipt.movement),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /stock/{id}: load a stock record.
#[tracing::instrument(skip(state))]
pub async fn get<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<StockRecordResponse>, ApiError> {
    let record_id: StockRecordId = parse_id("stock record id", &id)?;
    let record = state.orchestrator.ledger().record(record_id).await?;
    Ok(Json(StockRecordResponse::from(&record)))
}

/// GET /stock/{id}/movements: the movement log of a record, oldest first.
#[tracing::instrument(skip(state))]
pub async fn movements<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<MovementResponse>>, ApiError> {
    let record_id: StockRecordId = parse_id("stock record id", &id)?;
    let movements = state.orchestrator.ledger().movements(record_id).await?;
    Ok(Json(movements.iter().map(Into::into).collect()))
}

/// GET /stock/{id}/audit: reconcile a record against its movement log.
#[tracing::instrument(skip(state))]
pub async fn audit<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<AuditResponse>, ApiError> {
    let record_id: StockRecordId = parse_id("stock record id", &id)?;
    let audit = state.orchestrator.ledger().audit(record_id).await?;
    Ok(Json(AuditResponse::from(&audit)))
}
