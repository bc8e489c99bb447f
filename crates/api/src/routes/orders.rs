//! Order placement, status and restitution endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{BuyerId, OrderId};
use domain::{
    Actor, Cart, CartLine, Discount, DiscountKind, Money, Order, OrderLine, OrderStatus,
    StatusChange, TransitionKind, VariantKey,
};
use fulfillment::{
    FulfillmentError, LineProgress, LineReservation, OrderDetails, OutstandingLine,
    PartialFulfillment, PlacedOrder, ProgressState, ReservationProgress, Restitution,
    TransitionOutcome,
};
use ledger_store::{LedgerStore, OrderQuery};
use serde::{Deserialize, Serialize};

use super::stock::MovementResponse;
use super::{AppState, parse_id};
use crate::error::ApiError;

/// Page size when the caller gives none.
const DEFAULT_LIMIT: usize = 50;
/// Largest page a caller may request.
const MAX_LIMIT: usize = 500;

// -- Request types --

#[derive(Deserialize)]
pub struct PlaceOrderRequest {
    pub buyer_id: String,
    pub shipping_address: Option<String>,
    pub lines: Vec<OrderLineRequest>,
    pub discount_type: Option<String>,
    pub discount_value: Option<i64>,
    pub points_earned: Option<u32>,
    pub points_spent: Option<u32>,
}

#[derive(Deserialize)]
pub struct OrderLineRequest {
    pub product_id: String,
    pub color_id: Option<String>,
    pub size_id: Option<String>,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Deserialize)]
pub struct ListOrdersParams {
    pub buyer_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Deserialize)]
pub struct TransitionRequest {
    pub status: String,
    pub actor: String,
}

#[derive(Deserialize)]
pub struct RestituteRequest {
    pub actor: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub buyer_id: String,
    pub shipping_address: Option<String>,
    pub status: OrderStatus,
    /// False for orders stored before status tracking.
    pub status_recorded: bool,
    pub subtotal_cents: i64,
    pub discount_type: Option<DiscountKind>,
    pub discount_value: Option<i64>,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub points_earned: Option<u32>,
    pub points_spent: Option<u32>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<LineResponse>,
}

impl OrderResponse {
    fn new(order: &Order, lines: &[OrderLine]) -> Self {
        let pricing = order.pricing();
        Self {
            id: order.id().to_string(),
            buyer_id: order.buyer_id().to_string(),
            shipping_address: order.shipping_address().map(str::to_string),
            status: order.status(),
            status_recorded: order.stored_status().is_some(),
            subtotal_cents: pricing.subtotal.cents(),
            discount_type: pricing.discount.map(|d| d.kind()),
            discount_value: pricing.discount.map(|d| d.value()),
            discount_cents: pricing.discount_amount().cents(),
            total_cents: pricing.total.cents(),
            points_earned: pricing.points_earned,
            points_spent: pricing.points_spent,
            created_at: order.created_at(),
            lines: lines.iter().map(LineResponse::from).collect(),
        }
    }
}

#[derive(Serialize)]
pub struct LineResponse {
    pub id: String,
    pub position: u32,
    pub product_id: String,
    pub color_id: Option<String>,
    pub size_id: Option<String>,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

impl From<&OrderLine> for LineResponse {
    fn from(line: &OrderLine) -> Self {
        let variant = line.variant();
        Self {
            id: line.id().to_string(),
            position: line.position(),
            product_id: variant.product_id().to_string(),
            color_id: variant.color_id().map(ToString::to_string),
            size_id: variant.size_id().map(ToString::to_string),
            quantity: line.quantity(),
            unit_price_cents: line.unit_price().cents(),
            line_total_cents: line.line_total().cents(),
        }
    }
}

#[derive(Serialize)]
pub struct ReservationResponse {
    pub line_id: String,
    pub position: u32,
    pub stock_record_id: String,
    pub requested: u32,
    pub applied: u32,
    pub shortfall: u32,
    pub available_after: u32,
    pub replayed: bool,
}

impl From<&LineReservation> for ReservationResponse {
    fn from(r: &LineReservation) -> Self {
        Self {
            line_id: r.line_id.to_string(),
            position: r.position,
            stock_record_id: r.stock_record_id.to_string(),
            requested: r.requested,
            applied: r.applied,
            shortfall: r.shortfall(),
            available_after: r.available_after,
            replayed: r.replayed,
        }
    }
}

#[derive(Serialize)]
pub struct OutstandingResponse {
    pub line_id: String,
    pub position: u32,
    pub variant: String,
    pub quantity: u32,
    pub step: &'static str,
    pub reason: String,
}

impl From<&OutstandingLine> for OutstandingResponse {
    fn from(line: &OutstandingLine) -> Self {
        Self {
            line_id: line.line_id.to_string(),
            position: line.position,
            variant: line.variant.to_string(),
            quantity: line.quantity,
            step: line.step,
            reason: line.reason.clone(),
        }
    }
}

/// Body of place-order and resume responses.
#[derive(Serialize)]
pub struct PlacementResponse {
    pub order: OrderResponse,
    pub state: ProgressState,
    pub shortfall: u32,
    pub reservations: Vec<ReservationResponse>,
    pub outstanding: Vec<OutstandingResponse>,
}

impl From<&PlacedOrder> for PlacementResponse {
    fn from(placed: &PlacedOrder) -> Self {
        Self {
            order: OrderResponse::new(&placed.order, &placed.lines),
            state: ProgressState::FullyReserved,
            shortfall: placed.shortfall(),
            reservations: placed.reservations.iter().map(Into::into).collect(),
            outstanding: Vec::new(),
        }
    }
}

impl From<&PartialFulfillment> for PlacementResponse {
    fn from(partial: &PartialFulfillment) -> Self {
        Self {
            order: OrderResponse::new(&partial.order, &[]),
            state: ProgressState::Partial,
            shortfall: partial.reserved.iter().map(LineReservation::shortfall).sum(),
            reservations: partial.reserved.iter().map(Into::into).collect(),
            outstanding: partial.outstanding.iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize)]
pub struct TransitionResponse {
    pub order_id: String,
    pub previous: OrderStatus,
    pub status: OrderStatus,
    pub kind: TransitionKind,
    pub recorded: bool,
    pub restitution_pending: bool,
}

impl From<&TransitionOutcome> for TransitionResponse {
    fn from(outcome: &TransitionOutcome) -> Self {
        Self {
            order_id: outcome.order.id().to_string(),
            previous: outcome.previous,
            status: outcome.order.status(),
            kind: outcome.kind,
            recorded: outcome.change.is_some(),
            restitution_pending: outcome.restitution_pending,
        }
    }
}

#[derive(Serialize)]
pub struct StatusChangeResponse {
    pub id: String,
    pub old_status: Option<OrderStatus>,
    pub new_status: OrderStatus,
    pub actor: String,
    pub changed_at: DateTime<Utc>,
}

impl From<&StatusChange> for StatusChangeResponse {
    fn from(change: &StatusChange) -> Self {
        Self {
            id: change.id.to_string(),
            old_status: change.old_status,
            new_status: change.new_status,
            actor: change.actor.to_string(),
            changed_at: change.changed_at,
        }
    }
}

#[derive(Serialize)]
pub struct LineProgressResponse {
    pub line_id: String,
    pub position: u32,
    pub variant: String,
    pub quantity: u32,
    pub stock_record_id: Option<String>,
    pub reserved: bool,
    pub movement: Option<MovementResponse>,
}

impl From<&LineProgress> for LineProgressResponse {
    fn from(line: &LineProgress) -> Self {
        Self {
            line_id: line.line_id.to_string(),
            position: line.position,
            variant: line.variant.to_string(),
            quantity: line.quantity,
            stock_record_id: line.stock_record_id.map(|id| id.to_string()),
            reserved: line.is_reserved(),
            movement: line.movement.as_ref().map(Into::into),
        }
    }
}

#[derive(Serialize)]
pub struct ProgressResponse {
    pub order_id: String,
    pub state: ProgressState,
    pub reserved: usize,
    pub outstanding: usize,
    pub lines: Vec<LineProgressResponse>,
}

impl From<&ReservationProgress> for ProgressResponse {
    fn from(progress: &ReservationProgress) -> Self {
        Self {
            order_id: progress.order_id.to_string(),
            state: progress.state,
            reserved: progress.reserved_count(),
            outstanding: progress.outstanding_count(),
            lines: progress.lines.iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize)]
pub struct RestitutionResponse {
    pub order_id: String,
    pub actor: String,
    pub units_restored: u64,
    pub movements: Vec<MovementResponse>,
}

impl From<&Restitution> for RestitutionResponse {
    fn from(r: &Restitution) -> Self {
        Self {
            order_id: r.order_id.to_string(),
            actor: r.actor.to_string(),
            units_restored: r.units_restored,
            movements: r.movements.iter().map(Into::into).collect(),
        }
    }
}

// -- Handlers --

/// POST /orders: place an order and reserve stock for every line.
///
/// Answers 201 when every line was reserved and 202 with the outstanding
/// lines when the order was written but some decrements did not complete.
#[tracing::instrument(skip(state, req), fields(lines = req.lines.len()))]
pub async fn create<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<PlacementResponse>), ApiError> {
    let buyer_id: BuyerId = parse_id("buyer_id", &req.buyer_id)?;
    let cart = cart_from_request(req)?;

    placement(state.orchestrator.place_order(buyer_id, cart).await, StatusCode::CREATED)
}

/// GET /orders: list orders, newest first.
#[tracing::instrument(skip(state, params))]
pub async fn list<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<ListOrdersParams>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let mut query = OrderQuery::new()
        .limit(params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT))
        .offset(params.offset.unwrap_or(0));
    if let Some(buyer_id) = params.buyer_id.as_deref() {
        query = query.buyer_id(parse_id("buyer_id", buyer_id)?);
    }
    if let Some(status) = params.status.as_deref() {
        query = query.status(status.parse()?);
    }

    let orders = state.orchestrator.orders(query).await?;
    Ok(Json(
        orders
            .iter()
            .map(|order| OrderResponse::new(order, &[]))
            .collect(),
    ))
}

/// GET /orders/{id}: load an order with its lines.
#[tracing::instrument(skip(state))]
pub async fn get<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id("order id", &id)?;
    let OrderDetails { order, lines } = state.orchestrator.order(order_id).await?;
    Ok(Json(OrderResponse::new(&order, &lines)))
}

/// POST /orders/{id}/status: move an order to a new status.
#[tracing::instrument(skip(state, req), fields(status = %req.status))]
pub async fn transition<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let order_id: OrderId = parse_id("order id", &id)?;
    let requested: OrderStatus = req.status.parse()?;
    let actor = Actor::new(req.actor)?;

    let outcome = state
        .orchestrator
        .transition(order_id, requested, &actor)
        .await?;
    Ok(Json(TransitionResponse::from(&outcome)))
}

/// GET /orders/{id}/history: the status history of an order, oldest first.
#[tracing::instrument(skip(state))]
pub async fn history<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<StatusChangeResponse>>, ApiError> {
    let order_id: OrderId = parse_id("order id", &id)?;
    let history = state.orchestrator.history(order_id).await?;
    Ok(Json(history.iter().map(Into::into).collect()))
}

/// POST /orders/{id}/resume: retry the lines that have no decrement yet.
#[tracing::instrument(skip(state))]
pub async fn resume<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<PlacementResponse>), ApiError> {
    let order_id: OrderId = parse_id("order id", &id)?;
    placement(state.orchestrator.resume(order_id).await, StatusCode::OK)
}

/// GET /orders/{id}/progress: which lines of an order hold stock.
#[tracing::instrument(skip(state))]
pub async fn progress<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ProgressResponse>, ApiError> {
    let order_id: OrderId = parse_id("order id", &id)?;
    let progress = state.orchestrator.progress(order_id).await?;
    Ok(Json(ProgressResponse::from(&progress)))
}

/// POST /orders/{id}/restitute: return the stock of a cancelled order.
#[tracing::instrument(skip(state, req))]
pub async fn restitute<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<RestituteRequest>,
) -> Result<Json<RestitutionResponse>, ApiError> {
    let order_id: OrderId = parse_id("order id", &id)?;
    let actor = Actor::new(req.actor)?;
    let restitution = state.orchestrator.restitute(order_id, &actor).await?;
    Ok(Json(RestitutionResponse::from(&restitution)))
}

// -- Helpers --

fn cart_from_request(req: PlaceOrderRequest) -> Result<Cart, ApiError> {
    let mut cart = Cart::new().with_points(req.points_earned, req.points_spent);
    if let Some(address) = req.shipping_address {
        cart = cart.with_shipping_address(address);
    }

    match (req.discount_type.as_deref(), req.discount_value) {
        (Some(kind), Some(value)) => {
            let kind: DiscountKind = kind.parse()?;
            cart = cart.with_discount(Discount::from_parts(kind, value)?);
        }
        (None, None) => {}
        _ => {
            return Err(ApiError::BadRequest(
                "discount_type and discount_value must be given together".to_string(),
            ));
        }
    }

    for line in req.lines {
        let variant = VariantKey::new(
            line.product_id,
            line.color_id.map(Into::into),
            line.size_id.map(Into::into),
        )?;
        cart = cart.with_line(CartLine::new(
            variant,
            line.quantity,
            Money::from_cents(line.unit_price_cents),
        ));
    }
    Ok(cart)
}

/// Maps a placement result to `success` or 202 for a partial fulfillment.
fn placement(
    result: Result<PlacedOrder, FulfillmentError>,
    success: StatusCode,
) -> Result<(StatusCode, Json<PlacementResponse>), ApiError> {
    match result {
        Ok(placed) => Ok((success, Json(PlacementResponse::from(&placed)))),
        Err(FulfillmentError::PartialFulfillment(partial)) => Ok((
            StatusCode::ACCEPTED,
            Json(PlacementResponse::from(partial.as_ref())),
        )),
        Err(e) => Err(e.into()),
    }
}
