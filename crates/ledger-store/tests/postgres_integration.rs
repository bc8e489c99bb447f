//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container and truncate the tables
//! before each test, so they run serially. Run with:
//!
//! ```bash
//! cargo test -p ledger-store --test postgres_integration
//! ```

use std::sync::Arc;

use common::{BuyerId, OrderId};
use domain::{
    Actor, Cart, CartLine, Discount, Money, MovementKind, MovementRequest, NewOrder, OrderStatus,
    StatusChange, VariantKey,
};
use futures_util::future::join_all;
use ledger_store::{LedgerStore, LedgerStoreExt, OrderQuery, PostgresLedgerStore, StoreError};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresLedgerStore::new(temp_pool.clone())
                .run_migrations()
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresLedgerStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE order_status_history, stock_movements, order_lines, orders, stock_records",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresLedgerStore::new(pool)
}

fn key(product: &str) -> VariantKey {
    VariantKey::new(product, Some("red".into()), Some("M".into())).unwrap()
}

fn new_order(products: &[&str]) -> NewOrder {
    products
        .iter()
        .fold(Cart::new().with_shipping_address("1 Main St"), |cart, p| {
            cart.with_line(CartLine::new(key(p), 2, Money::from_cents(1250)))
        })
        .with_discount(Discount::Percentage(10))
        .with_points(Some(25), None)
        .build(BuyerId::new())
        .unwrap()
}

async fn stocked(store: &PostgresLedgerStore, product: &str, quantity: u32) -> domain::StockRecord {
    let record = store.create_stock_record(&key(product)).await.unwrap();
    store
        .apply_movement(MovementRequest::increment(record.id, None, quantity).unwrap())
        .await
        .unwrap();
    record
}

#[tokio::test]
#[serial]
async fn insert_and_load_order_round_trip() {
    let store = get_test_store().await;
    let new_order = new_order(&["P1", "P2"]);
    let order_id = new_order.order.id();

    store.insert_order(&new_order).await.unwrap();

    let (order, lines) = store.get_order_with_lines(order_id).await.unwrap().unwrap();
    assert_eq!(order.pricing(), new_order.order.pricing());
    assert_eq!(order.stored_status(), Some(OrderStatus::Pending));
    assert_eq!(order.shipping_address(), Some("1 Main St"));
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1].variant(), &key("P2"));
    assert_eq!(lines[1].position(), 1);
}

#[tokio::test]
#[serial]
async fn duplicate_order_is_rejected() {
    let store = get_test_store().await;
    let new_order = new_order(&["P1"]);
    store.insert_order(&new_order).await.unwrap();

    let result = store.insert_order(&new_order).await;
    assert!(matches!(result, Err(StoreError::DuplicateOrder(_))));
}

#[tokio::test]
#[serial]
async fn failed_line_rolls_back_order() {
    let store = get_test_store().await;
    let mut new_order = new_order(&["P1", "P2"]);
    // Reusing a line id violates the primary key on the second line.
    let first_id = new_order.lines[0].id();
    let second = &new_order.lines[1];
    new_order.lines[1] = domain::OrderLine::new(
        first_id,
        second.order_id(),
        second.position(),
        second.variant().clone(),
        second.quantity(),
        second.unit_price(),
    )
    .unwrap();

    let result = store.insert_order(&new_order).await;

    assert!(matches!(result, Err(StoreError::LineInsert { position: 1, .. })));
    assert!(store.get_order(new_order.order.id()).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn stock_records_are_unique_per_variant() {
    let store = get_test_store().await;
    let bare = VariantKey::product("P1").unwrap();

    let first = store.create_stock_record(&bare).await.unwrap();
    let second = store.create_stock_record(&bare).await.unwrap();
    let colored = store.create_stock_record(&key("P1")).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_ne!(first.id, colored.id);
    assert_eq!(
        store.find_stock_record(&bare).await.unwrap().map(|r| r.id),
        Some(first.id)
    );
}

#[tokio::test]
#[serial]
async fn decrement_clamps_and_logs_applied_amount() {
    let store = get_test_store().await;
    let record = stocked(&store, "P1", 3).await;

    let receipt = store
        .apply_movement(MovementRequest::decrement(record.id, OrderId::new(), 5).unwrap())
        .await
        .unwrap();

    assert_eq!(receipt.available(), 0);
    assert_eq!(receipt.movement.amount, 3);
    assert_eq!(receipt.movement.shortfall(), 2);

    let audit = store.audit_stock_record(record.id).await.unwrap().unwrap();
    assert!(audit.is_consistent());
    assert_eq!(audit.shortfall, 2);
}

#[tokio::test]
#[serial]
async fn order_movement_is_applied_once() {
    let store = get_test_store().await;
    let record = stocked(&store, "P1", 10).await;
    let order_id = OrderId::new();
    let request = MovementRequest::decrement(record.id, order_id, 4).unwrap();

    let first = store.apply_movement(request.clone()).await.unwrap();
    let second = store.apply_movement(request).await.unwrap();

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(second.movement.id, first.movement.id);
    let current = store.get_stock_record(record.id).await.unwrap().unwrap();
    assert_eq!(current.available, 6);
    assert!(
        store
            .find_movement(order_id, record.id, MovementKind::Decrement)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
#[serial]
async fn concurrent_decrements_never_oversell() {
    let store = get_test_store().await;
    let record = stocked(&store, "P1", 5).await;

    let attempts = (0..8).map(|_| {
        let store = store.clone();
        async move {
            store
                .apply_movement(MovementRequest::decrement(record.id, OrderId::new(), 1).unwrap())
                .await
                .unwrap()
        }
    });
    let receipts = join_all(attempts).await;

    let applied: u32 = receipts.iter().map(|r| r.movement.amount).sum();
    assert_eq!(applied, 5);
    let current = store.get_stock_record(record.id).await.unwrap().unwrap();
    assert_eq!(current.available, 0);
    let audit = store.audit_stock_record(record.id).await.unwrap().unwrap();
    assert!(audit.is_consistent());
    assert_eq!(audit.movement_count, 9);
}

#[tokio::test]
#[serial]
async fn status_change_is_conditional_and_logged() {
    let store = get_test_store().await;
    let new_order = new_order(&["P1"]);
    let order_id = new_order.order.id();
    store.insert_order(&new_order).await.unwrap();
    let actor = Actor::new("warehouse").unwrap();

    let stale = StatusChange::new(order_id, None, OrderStatus::Shipped, actor.clone());
    assert!(matches!(
        store.record_status_change(&stale).await,
        Err(StoreError::StatusConflict { .. })
    ));

    let change = StatusChange::new(
        order_id,
        Some(OrderStatus::Pending),
        OrderStatus::Shipped,
        actor,
    );
    store.record_status_change(&change).await.unwrap();

    let order = store.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status(), OrderStatus::Shipped);
    let history = store.status_history(order_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].old_status, Some(OrderStatus::Pending));
    assert_eq!(history[0].actor.as_str(), "warehouse");
}

#[tokio::test]
#[serial]
async fn legacy_null_status_reads_as_processing() {
    let store = get_test_store().await;
    let new_order = new_order(&["P1"]);
    let order_id = new_order.order.id();
    store.insert_order(&new_order).await.unwrap();
    sqlx::query("UPDATE orders SET status = NULL WHERE id = $1")
        .bind(order_id.as_uuid())
        .execute(store.pool())
        .await
        .unwrap();

    let order = store.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.stored_status(), None);
    assert_eq!(order.status(), OrderStatus::Processing);

    let processing = store
        .query_orders(OrderQuery::new().status(OrderStatus::Processing))
        .await
        .unwrap();
    assert_eq!(processing.len(), 1);
}

#[tokio::test]
#[serial]
async fn query_orders_filters_and_pages() {
    let store = get_test_store().await;
    let a = new_order(&["P1"]);
    let b = new_order(&["P2"]);
    store.insert_order(&a).await.unwrap();
    store.insert_order(&b).await.unwrap();

    let all = store.query_orders(OrderQuery::new()).await.unwrap();
    assert_eq!(all.len(), 2);

    let mine = store
        .query_orders(OrderQuery::for_buyer(a.order.buyer_id()))
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id(), a.order.id());

    let page = store
        .query_orders(OrderQuery::new().limit(1).offset(1))
        .await
        .unwrap();
    assert_eq!(page.len(), 1);

    let shipped = store
        .query_orders(OrderQuery::new().status(OrderStatus::Shipped))
        .await
        .unwrap();
    assert!(shipped.is_empty());
}

#[tokio::test]
#[serial]
async fn movement_log_is_append_only() {
    let store = get_test_store().await;
    let record = stocked(&store, "P1", 1).await;

    let result = sqlx::query("DELETE FROM stock_movements WHERE stock_record_id = $1")
        .bind(record.id.as_uuid())
        .execute(store.pool())
        .await;
    assert!(result.is_err());
}
