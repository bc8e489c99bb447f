use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BuyerId, MovementId, OrderId, OrderLineId, StatusChangeId, StockRecordId};
use domain::{
    Actor, Discount, DiscountKind, Money, MovementKind, MovementRequest, NewOrder, Order,
    OrderLine, OrderPricing, OrderStatus, StatusChange, StockMovement, StockRecord, VariantId,
    VariantKey,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    OrderQuery, Result, StoreError,
    error::is_transient_sqlx,
    store::{LedgerStore, MovementReceipt},
};

const ORDER_COLUMNS: &str = "id, buyer_id, shipping_address, subtotal_cents, total_cents, \
     discount_type, discount_value, points_earned, points_spent, status, created_at";

const MOVEMENT_COLUMNS: &str = "id, stock_record_id, order_id, kind, requested, amount, \
     available_after, created_at";

const STOCK_COLUMNS: &str = "id, product_id, color_id, size_id, available, created_at, updated_at";

/// PostgreSQL-backed ledger store implementation.
///
/// Stock movements lock the record row (`SELECT ... FOR UPDATE`) and then
/// update the count with a single `UPDATE` evaluated against the stored
/// value, so concurrent decrements from any number of processes serialize
/// on the row.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    /// Creates a new PostgreSQL ledger store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let discount = match (
            row.try_get::<Option<String>, _>("discount_type")?,
            row.try_get::<Option<i64>, _>("discount_value")?,
        ) {
            (Some(kind), Some(value)) => {
                let kind: DiscountKind = kind
                    .parse()
                    .map_err(|e| StoreError::invalid_row("orders", e))?;
                Some(
                    Discount::from_parts(kind, value)
                        .map_err(|e| StoreError::invalid_row("orders", e))?,
                )
            }
            _ => None,
        };

        let pricing = OrderPricing {
            subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
            discount,
            total: Money::from_cents(row.try_get("total_cents")?),
            points_earned: optional_u32(row.try_get("points_earned")?, "orders")?,
            points_spent: optional_u32(row.try_get("points_spent")?, "orders")?,
        };

        let status = row
            .try_get::<Option<String>, _>("status")?
            .map(|s| s.parse::<OrderStatus>())
            .transpose()
            .map_err(|e| StoreError::invalid_row("orders", e))?;

        Order::new(
            OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            BuyerId::from_uuid(row.try_get::<Uuid, _>("buyer_id")?),
            row.try_get("shipping_address")?,
            pricing,
            status,
            row.try_get::<DateTime<Utc>, _>("created_at")?,
        )
        .map_err(|e| StoreError::invalid_row("orders", e))
    }

    fn row_to_line(row: PgRow) -> Result<OrderLine> {
        let position: i32 = row.try_get("position")?;
        OrderLine::new(
            OrderLineId::from_uuid(row.try_get::<Uuid, _>("id")?),
            OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            u32::try_from(position).map_err(|e| StoreError::invalid_row("order_lines", e))?,
            Self::variant_key(&row, "order_lines")?,
            to_u32(row.try_get("quantity")?, "order_lines")?,
            Money::from_cents(row.try_get("unit_price_cents")?),
        )
        .map_err(|e| StoreError::invalid_row("order_lines", e))
    }

    fn row_to_stock_record(row: PgRow) -> Result<StockRecord> {
        Ok(StockRecord {
            id: StockRecordId::from_uuid(row.try_get::<Uuid, _>("id")?),
            key: Self::variant_key(&row, "stock_records")?,
            available: to_u32(row.try_get("available")?, "stock_records")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_movement(row: PgRow) -> Result<StockMovement> {
        let kind: String = row.try_get("kind")?;
        Ok(StockMovement {
            id: MovementId::from_uuid(row.try_get::<Uuid, _>("id")?),
            stock_record_id: StockRecordId::from_uuid(row.try_get::<Uuid, _>("stock_record_id")?),
            order_id: row
                .try_get::<Option<Uuid>, _>("order_id")?
                .map(OrderId::from_uuid),
            kind: kind
                .parse()
                .map_err(|e: String| StoreError::invalid_row("stock_movements", e))?,
            requested: to_u32(row.try_get("requested")?, "stock_movements")?,
            amount: to_u32(row.try_get("amount")?, "stock_movements")?,
            available_after: to_u32(row.try_get("available_after")?, "stock_movements")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_status_change(row: PgRow) -> Result<StatusChange> {
        let parse = |value: String| {
            value
                .parse::<OrderStatus>()
                .map_err(|e| StoreError::invalid_row("order_status_history", e))
        };
        Ok(StatusChange {
            id: StatusChangeId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            old_status: row
                .try_get::<Option<String>, _>("old_status")?
                .map(parse)
                .transpose()?,
            new_status: parse(row.try_get("new_status")?)?,
            actor: Actor::new(row.try_get::<String, _>("actor")?)
                .map_err(|e| StoreError::invalid_row("order_status_history", e))?,
            changed_at: row.try_get("changed_at")?,
        })
    }

    fn variant_key(row: &PgRow, table: &'static str) -> Result<VariantKey> {
        VariantKey::new(
            row.try_get::<String, _>("product_id")?,
            row.try_get::<Option<String>, _>("color_id")?
                .map(VariantId::from),
            row.try_get::<Option<String>, _>("size_id")?
                .map(VariantId::from),
        )
        .map_err(|e| StoreError::invalid_row(table, e))
    }

    async fn find_movement_in(
        tx: &mut Transaction<'_, Postgres>,
        order_id: OrderId,
        stock_record_id: StockRecordId,
        kind: MovementKind,
    ) -> Result<Option<StockMovement>> {
        let row = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
             WHERE order_id = $1 AND stock_record_id = $2 AND kind = $3"
        ))
        .bind(order_id.as_uuid())
        .bind(stock_record_id.as_uuid())
        .bind(kind.as_str())
        .fetch_optional(&mut **tx)
        .await?;

        row.map(Self::row_to_movement).transpose()
    }
}

fn to_u32(value: i64, table: &'static str) -> Result<u32> {
    u32::try_from(value).map_err(|e| StoreError::invalid_row(table, e))
}

fn optional_u32(value: Option<i64>, table: &'static str) -> Result<Option<u32>> {
    value.map(|v| to_u32(v, table)).transpose()
}

fn to_i32(value: u32, table: &'static str) -> Result<i32> {
    i32::try_from(value).map_err(|e| StoreError::invalid_row(table, e))
}

fn to_i64(value: usize, table: &'static str) -> Result<i64> {
    i64::try_from(value).map_err(|e| StoreError::invalid_row(table, e))
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn insert_order(&self, new_order: &NewOrder) -> Result<()> {
        let order = &new_order.order;
        let pricing = order.pricing();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, buyer_id, shipping_address, subtotal_cents, total_cents,
                                discount_type, discount_value, points_earned, points_spent,
                                status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.buyer_id().as_uuid())
        .bind(order.shipping_address())
        .bind(pricing.subtotal.cents())
        .bind(pricing.total.cents())
        .bind(pricing.discount.map(|d| d.kind().as_str()))
        .bind(pricing.discount.map(|d| d.value()))
        .bind(pricing.points_earned.map(i64::from))
        .bind(pricing.points_spent.map(i64::from))
        .bind(order.stored_status().map(|s| s.as_str()))
        .bind(order.created_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("orders_pkey")
            {
                return StoreError::DuplicateOrder(order.id());
            }
            StoreError::Database(e)
        })?;

        for line in &new_order.lines {
            let position = to_i32(line.position(), "order_lines")?;
            sqlx::query(
                r#"
                INSERT INTO order_lines (id, order_id, position, product_id, color_id, size_id,
                                         quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(line.id().as_uuid())
            .bind(order.id().as_uuid())
            .bind(position)
            .bind(line.variant().product_id().as_str())
            .bind(line.variant().color_id().map(|c| c.as_str()))
            .bind(line.variant().size_id().map(|s| s.as_str()))
            .bind(i64::from(line.quantity()))
            .bind(line.unit_price().cents())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::LineInsert {
                order_id: order.id(),
                position: line.position(),
                reason: e.to_string(),
                transient: is_transient_sqlx(&e),
            })?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn get_order_lines(&self, order_id: OrderId) -> Result<Vec<OrderLine>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, position, product_id, color_id, size_id, quantity, unit_price_cents
            FROM order_lines
            WHERE order_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_line).collect()
    }

    async fn query_orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.buyer_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND buyer_id = ${param_count}"));
        }
        if let Some(status) = query.status {
            param_count += 1;
            if status == OrderStatus::Processing {
                sql.push_str(&format!(" AND (status = ${param_count} OR status IS NULL)"));
            } else {
                sql.push_str(&format!(" AND status = ${param_count}"));
            }
        }

        sql.push_str(" ORDER BY created_at DESC, id ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let limit = query.limit.map(|v| to_i64(v, "orders")).transpose()?;
        let offset = query.offset.map(|v| to_i64(v, "orders")).transpose()?;
        let mut sqlx_query = sqlx::query(&sql);

        if let Some(buyer_id) = query.buyer_id {
            sqlx_query = sqlx_query.bind(buyer_id.as_uuid());
        }
        if let Some(status) = query.status {
            sqlx_query = sqlx_query.bind(status.as_str());
        }
        if let Some(limit) = limit {
            sqlx_query = sqlx_query.bind(limit);
        }
        if let Some(offset) = offset {
            sqlx_query = sqlx_query.bind(offset);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn find_stock_record(&self, key: &VariantKey) -> Result<Option<StockRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {STOCK_COLUMNS} FROM stock_records \
             WHERE product_id = $1 \
               AND color_id IS NOT DISTINCT FROM $2 \
               AND size_id IS NOT DISTINCT FROM $3"
        ))
        .bind(key.product_id().as_str())
        .bind(key.color_id().map(|c| c.as_str()))
        .bind(key.size_id().map(|s| s.as_str()))
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_stock_record).transpose()
    }

    async fn get_stock_record(&self, id: StockRecordId) -> Result<Option<StockRecord>> {
        let row = sqlx::query(&format!("SELECT {STOCK_COLUMNS} FROM stock_records WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_stock_record).transpose()
    }

    async fn create_stock_record(&self, key: &VariantKey) -> Result<StockRecord> {
        // The unique variant index makes a racing insert a no-op; either way
        // the surviving row is read back.
        sqlx::query(
            r#"
            INSERT INTO stock_records (id, product_id, color_id, size_id, available)
            VALUES ($1, $2, $3, $4, 0)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(StockRecordId::new().as_uuid())
        .bind(key.product_id().as_str())
        .bind(key.color_id().map(|c| c.as_str()))
        .bind(key.size_id().map(|s| s.as_str()))
        .execute(&self.pool)
        .await?;

        self.find_stock_record(key).await?.ok_or_else(|| {
            StoreError::invalid_row("stock_records", format!("record for {key} vanished"))
        })
    }

    async fn apply_movement(&self, request: MovementRequest) -> Result<MovementReceipt> {
        let record_id = request.stock_record_id;
        let mut tx = self.pool.begin().await?;

        let before: Option<i64> =
            sqlx::query_scalar("SELECT available FROM stock_records WHERE id = $1 FOR UPDATE")
                .bind(record_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
        let before = before.ok_or(StoreError::StockRecordNotFound(record_id))?;

        // Replays serialize on the row lock, so a committed movement is visible here.
        if let Some(order_id) = request.order_id
            && let Some(existing) =
                Self::find_movement_in(&mut tx, order_id, record_id, request.kind).await?
        {
            tx.rollback().await?;
            tracing::debug!(%order_id, stock_record_id = %record_id, "movement replayed");
            return Ok(MovementReceipt {
                movement: existing,
                replayed: true,
            });
        }

        let update = match request.kind {
            MovementKind::Decrement => {
                "UPDATE stock_records SET available = GREATEST(available - $2, 0), updated_at = NOW() \
                 WHERE id = $1 RETURNING available"
            }
            MovementKind::Increment => {
                "UPDATE stock_records SET available = available + $2, updated_at = NOW() \
                 WHERE id = $1 RETURNING available"
            }
        };
        let after: i64 = sqlx::query_scalar(update)
            .bind(record_id.as_uuid())
            .bind(i64::from(request.quantity))
            .fetch_one(&mut *tx)
            .await?;

        let movement = StockMovement {
            id: MovementId::new(),
            stock_record_id: record_id,
            order_id: request.order_id,
            kind: request.kind,
            requested: request.quantity,
            amount: to_u32((after - before).abs(), "stock_records")?,
            available_after: to_u32(after, "stock_records")?,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO stock_movements (id, stock_record_id, order_id, kind, requested, amount,
                                         available_after, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(movement.id.as_uuid())
        .bind(record_id.as_uuid())
        .bind(movement.order_id.map(|id| id.as_uuid()))
        .bind(movement.kind.as_str())
        .bind(i64::from(movement.requested))
        .bind(i64::from(movement.amount))
        .bind(i64::from(movement.available_after))
        .bind(movement.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(MovementReceipt {
            movement,
            replayed: false,
        })
    }

    async fn find_movement(
        &self,
        order_id: OrderId,
        stock_record_id: StockRecordId,
        kind: MovementKind,
    ) -> Result<Option<StockMovement>> {
        let row = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
             WHERE order_id = $1 AND stock_record_id = $2 AND kind = $3"
        ))
        .bind(order_id.as_uuid())
        .bind(stock_record_id.as_uuid())
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_movement).transpose()
    }

    async fn movements_for_record(&self, id: StockRecordId) -> Result<Vec<StockMovement>> {
        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
             WHERE stock_record_id = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_movement).collect()
    }

    async fn movements_for_order(&self, order_id: OrderId) -> Result<Vec<StockMovement>> {
        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
             WHERE order_id = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_movement).collect()
    }

    async fn record_status_change(&self, change: &StatusChange) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let current: Option<Option<String>> =
            sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
                .bind(change.order_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
        let current = current
            .ok_or(StoreError::OrderNotFound(change.order_id))?
            .map(|s| s.parse::<OrderStatus>())
            .transpose()
            .map_err(|e| StoreError::invalid_row("orders", e))?;

        if current != change.old_status {
            return Err(StoreError::StatusConflict {
                order_id: change.order_id,
                expected: change.old_status,
                actual: current,
            });
        }

        sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
            .bind(change.order_id.as_uuid())
            .bind(change.new_status.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO order_status_history (id, order_id, old_status, new_status, actor, changed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(change.id.as_uuid())
        .bind(change.order_id.as_uuid())
        .bind(change.old_status.map(|s| s.as_str()))
        .bind(change.new_status.as_str())
        .bind(change.actor.as_str())
        .bind(change.changed_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn status_history(&self, order_id: OrderId) -> Result<Vec<StatusChange>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, old_status, new_status, actor, changed_at
            FROM order_status_history
            WHERE order_id = $1
            ORDER BY changed_at ASC, id ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_status_change).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_conversions_reject_out_of_range_values() {
        assert_eq!(to_i32(7, "order_lines").unwrap(), 7);
        assert!(matches!(
            to_i32(u32::MAX, "order_lines"),
            Err(StoreError::InvalidRow { table: "order_lines", .. })
        ));

        assert_eq!(to_i64(500, "orders").unwrap(), 500);
        assert!(matches!(
            to_i64(usize::MAX, "orders"),
            Err(StoreError::InvalidRow { table: "orders", .. })
        ));
    }
}
