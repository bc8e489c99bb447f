use common::{BuyerId, OrderId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{Cart, CartLine, Money, MovementRequest, VariantKey};
use ledger_store::{InMemoryLedgerStore, LedgerStore, LedgerStoreExt, OrderQuery};

fn key(product: &str) -> VariantKey {
    VariantKey::new(product, Some("red".into()), Some("M".into())).unwrap()
}

fn bench_insert_order(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryLedgerStore::new();

    c.bench_function("ledger_store/insert_order_5_lines", |b| {
        b.iter(|| {
            rt.block_on(async {
                let new_order = (0..5)
                    .fold(Cart::new(), |cart, i| {
                        cart.with_line(CartLine::new(
                            key(&format!("P{i}")),
                            1,
                            Money::from_cents(999),
                        ))
                    })
                    .build(BuyerId::new())
                    .unwrap();
                store.insert_order(&new_order).await.unwrap();
            });
        });
    });
}

fn bench_decrement(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryLedgerStore::new();
    let record = rt.block_on(async {
        let record = store.create_stock_record(&key("P1")).await.unwrap();
        store
            .apply_movement(MovementRequest::increment(record.id, None, u32::MAX / 2).unwrap())
            .await
            .unwrap();
        record
    });

    c.bench_function("ledger_store/decrement", |b| {
        b.iter(|| {
            rt.block_on(async {
                store
                    .apply_movement(
                        MovementRequest::decrement(record.id, OrderId::new(), 1).unwrap(),
                    )
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_replayed_decrement(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryLedgerStore::new();
    let request = rt.block_on(async {
        let record = store.create_stock_record(&key("P1")).await.unwrap();
        let request = MovementRequest::decrement(record.id, OrderId::new(), 1).unwrap();
        store.apply_movement(request.clone()).await.unwrap();
        request
    });

    c.bench_function("ledger_store/replayed_decrement", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.apply_movement(request.clone()).await.unwrap();
            });
        });
    });
}

fn bench_audit_1000_movements(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryLedgerStore::new();
    let record = rt.block_on(async {
        let record = store.create_stock_record(&key("P1")).await.unwrap();
        for _ in 0..1000 {
            store
                .apply_movement(MovementRequest::increment(record.id, None, 3).unwrap())
                .await
                .unwrap();
        }
        record
    });

    c.bench_function("ledger_store/audit_1000_movements", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.audit_stock_record(record.id).await.unwrap();
            });
        });
    });
}

fn bench_query_orders(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryLedgerStore::new();
    let buyer = BuyerId::new();
    rt.block_on(async {
        for i in 0..500 {
            let buyer_id = if i % 10 == 0 { buyer } else { BuyerId::new() };
            let new_order = Cart::new()
                .with_line(CartLine::new(key("P1"), 1, Money::from_cents(100)))
                .build(buyer_id)
                .unwrap();
            store.insert_order(&new_order).await.unwrap();
        }
    });

    c.bench_function("ledger_store/query_orders_for_buyer", |b| {
        b.iter(|| {
            rt.block_on(async {
                store
                    .query_orders(OrderQuery::for_buyer(buyer).limit(20))
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_insert_order,
    bench_decrement,
    bench_replayed_decrement,
    bench_audit_1000_movements,
    bench_query_orders,
);
criterion_main!(benches);
