use common::BuyerId;
use domain::{Order, OrderStatus};

/// Builder for order listing queries.
///
/// Results are ordered newest first.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    /// Filter by buyer.
    pub buyer_id: Option<BuyerId>,

    /// Filter by effective status. `Processing` also matches orders whose
    /// status was never set.
    pub status: Option<OrderStatus>,

    /// Maximum number of orders to return.
    pub limit: Option<usize>,

    /// Number of orders to skip.
    pub offset: Option<usize>,
}

impl OrderQuery {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for one buyer's orders.
    pub fn for_buyer(buyer_id: BuyerId) -> Self {
        Self {
            buyer_id: Some(buyer_id),
            ..Default::default()
        }
    }

    /// Filters by buyer.
    pub fn buyer_id(mut self, buyer_id: BuyerId) -> Self {
        self.buyer_id = Some(buyer_id);
        self
    }

    /// Filters by effective status.
    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Limits the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips a number of results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// In-process evaluation of the filters, used by the in-memory store.
    pub(crate) fn matches(&self, order: &Order) -> bool {
        if let Some(buyer_id) = self.buyer_id
            && order.buyer_id() != buyer_id
        {
            return false;
        }
        if let Some(status) = self.status
            && order.status() != status
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let buyer = BuyerId::new();
        let query = OrderQuery::for_buyer(buyer)
            .status(OrderStatus::Shipped)
            .limit(10)
            .offset(20);

        assert_eq!(query.buyer_id, Some(buyer));
        assert_eq!(query.status, Some(OrderStatus::Shipped));
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.offset, Some(20));
    }
}
