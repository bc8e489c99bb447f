//! Fulfillment orchestrator: sequences order creation and stock reservation.

use std::collections::HashSet;

use common::{BuyerId, OrderId, OrderLineId};
use domain::{
    Actor, Cart, MovementKind, Order, OrderLine, OrderStatus, StatusChange, ValidationError,
};
use ledger_store::{LedgerStore, LedgerStoreExt, OrderQuery};

use crate::builder::OrderBuilder;
use crate::error::{FulfillmentError, Result};
use crate::ledger::StockLedger;
use crate::reservation::{
    LineProgress, LineReservation, OrderDetails, OutstandingLine, PartialFulfillment,
    PlacedOrder, ReservationProgress, Restitution,
};
use crate::resolver::VariantResolver;
use crate::status::{OrderStatusMachine, TransitionOutcome};

/// Drives "place order" end to end.
///
/// The order and its lines are written first, in one transaction. Each
/// line is then resolved and decremented on its own; a failing line does
/// not stop later lines, and the call reports every outstanding line in a
/// `PartialFulfillment`. Decrements are idempotent per line, so `resume`
/// can retry safely after a timeout or crash.
#[derive(Clone)]
pub struct FulfillmentOrchestrator<S: LedgerStore> {
    store: S,
    builder: OrderBuilder<S>,
    resolver: VariantResolver<S>,
    ledger: StockLedger<S>,
    status: OrderStatusMachine<S>,
}

impl<S: LedgerStore + Clone> FulfillmentOrchestrator<S> {
    /// Creates a new orchestrator over `store`.
    pub fn new(store: S) -> Self {
        Self {
            builder: OrderBuilder::new(store.clone()),
            resolver: VariantResolver::new(store.clone()),
            ledger: StockLedger::new(store.clone()),
            status: OrderStatusMachine::new(store.clone()),
            store,
        }
    }

    /// Whether repeated requests for the current status are recorded.
    pub fn with_noop_recording(mut self, record_noops: bool) -> Self {
        self.status = self.status.with_noop_recording(record_noops);
        self
    }

    pub fn ledger(&self) -> &StockLedger<S> {
        &self.ledger
    }

    pub fn resolver(&self) -> &VariantResolver<S> {
        &self.resolver
    }

    pub fn status_machine(&self) -> &OrderStatusMachine<S> {
        &self.status
    }

    /// Places an order for `buyer_id` and reserves stock for every line.
    ///
    /// Lines are clamped at available stock rather than rejected; the
    /// shortfall is reported on the result.
    #[tracing::instrument(skip(self, cart), fields(lines = cart.lines.len()))]
    pub async fn place_order(&self, buyer_id: BuyerId, cart: Cart) -> Result<PlacedOrder> {
        let start = std::time::Instant::now();

        if cart.is_empty() {
            return Err(ValidationError::EmptyCart.into());
        }

        let new_order = self.builder.create_order(buyer_id, &cart).await?;
        metrics::counter!("orders_placed_total").increment(1);

        let result = self
            .reserve_lines(new_order.order, new_order.lines, Vec::new())
            .await;

        metrics::histogram!("place_order_duration_seconds")
            .record(start.elapsed().as_secs_f64());
        result
    }

    /// Retries the lines of an order that have no decrement yet.
    ///
    /// Lines already reserved are reported from the movement log without
    /// being touched.
    #[tracing::instrument(skip(self))]
    pub async fn resume(&self, order_id: OrderId) -> Result<PlacedOrder> {
        let OrderDetails { order, lines } = self.order(order_id).await?;
        if order.status() == OrderStatus::Cancelled {
            return Err(FulfillmentError::OrderCancelled(order_id));
        }

        let progress = self.line_progress(&order, &lines).await?;
        let reserved: Vec<_> = lines
            .iter()
            .zip(&progress)
            .filter_map(|(line, progress)| {
                progress
                    .movement
                    .as_ref()
                    .map(|movement| LineReservation::from_movement(line, movement, true))
            })
            .collect();

        tracing::info!(
            reserved = reserved.len(),
            outstanding = lines.len() - reserved.len(),
            "resuming order"
        );
        self.reserve_lines(order, lines, reserved).await
    }

    /// Reports which lines of an order have been reserved.
    ///
    /// Never provisions stock records.
    pub async fn progress(&self, order_id: OrderId) -> Result<ReservationProgress> {
        let OrderDetails { order, lines } = self.order(order_id).await?;
        let lines = self.line_progress(&order, &lines).await?;
        Ok(ReservationProgress::new(order_id, lines))
    }

    /// Returns the stock a cancelled order took.
    ///
    /// Issues one increment per decremented record for the amount actually
    /// applied. Increments are idempotent, so calling this again returns the
    /// same movements and restores nothing more.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.as_str()))]
    pub async fn restitute(&self, order_id: OrderId, actor: &Actor) -> Result<Restitution> {
        let order = self.load_order(order_id).await?;
        if order.status() != OrderStatus::Cancelled {
            return Err(FulfillmentError::NotCancelled {
                order_id,
                status: order.status(),
            });
        }

        let decrements: Vec<_> = self
            .store
            .movements_for_order(order_id)
            .await
            .map_err(FulfillmentError::store("load_movements"))?
            .into_iter()
            .filter(|m| m.kind == MovementKind::Decrement && m.amount > 0)
            .collect();

        let mut movements = Vec::with_capacity(decrements.len());
        let mut units_restored = 0u64;
        for decrement in decrements {
            let receipt = self
                .ledger
                .increment(decrement.stock_record_id, Some(order_id), decrement.amount)
                .await?;
            if !receipt.replayed {
                units_restored += u64::from(receipt.movement.amount);
            }
            movements.push(receipt.movement);
        }

        tracing::info!(
            units_restored,
            actor = %actor.as_str(),
            "order stock restituted"
        );
        Ok(Restitution {
            order_id,
            actor: actor.clone(),
            movements,
            units_restored,
        })
    }

    /// Moves an order to `requested`; see [`OrderStatusMachine::transition`].
    pub async fn transition(
        &self,
        order_id: OrderId,
        requested: OrderStatus,
        actor: &Actor,
    ) -> Result<TransitionOutcome> {
        self.status.transition(order_id, requested, actor).await
    }

    /// Returns the status history of an order.
    pub async fn history(&self, order_id: OrderId) -> Result<Vec<StatusChange>> {
        self.status.history(order_id).await
    }

    /// Loads an order with its lines.
    pub async fn order(&self, order_id: OrderId) -> Result<OrderDetails> {
        let (order, lines) = self
            .store
            .get_order_with_lines(order_id)
            .await
            .map_err(FulfillmentError::store("load_order"))?
            .ok_or(FulfillmentError::OrderNotFound(order_id))?;
        Ok(OrderDetails { order, lines })
    }

    /// Lists orders, newest first. Always reads through to the store.
    pub async fn orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        self.store
            .query_orders(query)
            .await
            .map_err(FulfillmentError::store("query_orders"))
    }

    async fn load_order(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await
            .map_err(FulfillmentError::store("load_order"))?
            .ok_or(FulfillmentError::OrderNotFound(order_id))
    }

    /// Reserves every line not already in `reserved`, in order, continuing
    /// past failures.
    async fn reserve_lines(
        &self,
        order: Order,
        lines: Vec<OrderLine>,
        mut reserved: Vec<LineReservation>,
    ) -> Result<PlacedOrder> {
        let order_id = order.id();
        let done: HashSet<OrderLineId> = reserved.iter().map(|r| r.line_id).collect();
        let mut outstanding = Vec::new();

        for line in lines.iter().filter(|l| !done.contains(&l.id())) {
            match self.reserve_line(order_id, line).await {
                Ok(reservation) => reserved.push(reservation),
                Err(e) => {
                    tracing::warn!(
                        %order_id,
                        position = line.position(),
                        step = e.step(),
                        error = %e,
                        "line reservation failed"
                    );
                    outstanding.push(OutstandingLine::new(line, e.step(), &e));
                }
            }
        }
        reserved.sort_by_key(|r| r.position);

        if !outstanding.is_empty() {
            metrics::counter!("partial_fulfillments_total").increment(1);
            return Err(FulfillmentError::PartialFulfillment(Box::new(
                PartialFulfillment {
                    order,
                    reserved,
                    outstanding,
                },
            )));
        }

        let placed = PlacedOrder {
            order,
            lines,
            reservations: reserved,
        };
        tracing::info!(%order_id, shortfall = placed.shortfall(), "order fully reserved");
        Ok(placed)
    }

    async fn reserve_line(&self, order_id: OrderId, line: &OrderLine) -> Result<LineReservation> {
        let record = self.resolver.resolve(line.variant()).await?;
        let receipt = self
            .ledger
            .decrement(record.id, order_id, line.quantity())
            .await?;
        Ok(LineReservation::new(line, &receipt))
    }

    async fn line_progress(&self, order: &Order, lines: &[OrderLine]) -> Result<Vec<LineProgress>> {
        let mut progress = Vec::with_capacity(lines.len());
        for line in lines {
            let record = self.resolver.lookup(line.variant()).await?;
            let movement = match &record {
                Some(record) => self
                    .store
                    .find_movement(order.id(), record.id, MovementKind::Decrement)
                    .await
                    .map_err(FulfillmentError::store("load_movements"))?,
                None => None,
            };
            progress.push(LineProgress {
                line_id: line.id(),
                position: line.position(),
                variant: line.variant().clone(),
                quantity: line.quantity(),
                stock_record_id: record.map(|r| r.id),
                movement,
            });
        }
        Ok(progress)
    }
}
