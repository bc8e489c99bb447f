//! HTTP API server with observability for the order fulfillment ledger.
//!
//! Provides REST endpoints for placing orders, driving their status and
//! inspecting the stock ledger, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use fulfillment::FulfillmentOrchestrator;
use ledger_store::LedgerStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: LedgerStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::observability::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::observability::health::<S>))
        .route(
            "/orders",
            post(routes::orders::create::<S>).get(routes::orders::list::<S>),
        )
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/status", post(routes::orders::transition::<S>))
        .route("/orders/{id}/history", get(routes::orders::history::<S>))
        .route("/orders/{id}/resume", post(routes::orders::resume::<S>))
        .route("/orders/{id}/progress", get(routes::orders::progress::<S>))
        .route("/orders/{id}/restitute", post(routes::orders::restitute::<S>))
        .route("/stock", post(routes::stock::provision::<S>))
        .route("/stock/{id}", get(routes::stock::get::<S>))
        .route("/stock/{id}/movements", get(routes::stock::movements::<S>))
        .route("/stock/{id}/audit", get(routes::stock::audit::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state over `store`.
///
/// `store_kind` names the backend in health responses.
pub fn create_state<S: LedgerStore + Clone + 'static>(
    store: S,
    store_kind: &'static str,
    config: &Config,
) -> Arc<AppState<S>> {
    let orchestrator =
        FulfillmentOrchestrator::new(store).with_noop_recording(config.record_noop_transitions);
    Arc::new(AppState {
        orchestrator,
        store_kind,
    })
}
