//! Order and order line entities.

use chrono::{DateTime, Utc};
use common::{BuyerId, OrderId, OrderLineId};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::stock::VariantKey;

use super::{Discount, Money, OrderStatus};

/// Monetary and loyalty figures persisted on an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPricing {
    /// Sum of `unit_price * quantity` over all lines.
    pub subtotal: Money,
    pub discount: Option<Discount>,
    /// `max(0, subtotal - discount)`.
    pub total: Money,
    /// Points granted by the loyalty service; stored, not validated.
    pub points_earned: Option<u32>,
    pub points_spent: Option<u32>,
}

impl OrderPricing {
    /// Prices a subtotal with an optional discount.
    pub fn new(subtotal: Money, discount: Option<Discount>) -> Self {
        let off = discount.map_or(Money::zero(), |d| d.amount_off(subtotal));
        Self {
            subtotal,
            discount,
            total: subtotal.saturating_sub(off),
            points_earned: None,
            points_spent: None,
        }
    }

    pub fn with_points(mut self, earned: Option<u32>, spent: Option<u32>) -> Self {
        self.points_earned = earned;
        self.points_spent = spent;
        self
    }

    /// Amount the discount took off the subtotal.
    pub fn discount_amount(&self) -> Money {
        self.subtotal.saturating_sub(self.total)
    }
}

/// A persisted order.
///
/// The id, buyer and pricing never change after creation. Status is only
/// written by the order status machine and is `None` for orders created
/// before status tracking existed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    buyer_id: BuyerId,
    shipping_address: Option<String>,
    pricing: OrderPricing,
    status: Option<OrderStatus>,
    created_at: DateTime<Utc>,
}

impl Order {
    /// Builds an order, checking that the total is not negative.
    pub fn new(
        id: OrderId,
        buyer_id: BuyerId,
        shipping_address: Option<String>,
        pricing: OrderPricing,
        status: Option<OrderStatus>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if pricing.total.is_negative() {
            return Err(ValidationError::NegativeTotal {
                cents: pricing.total.cents(),
            });
        }
        Ok(Self {
            id,
            buyer_id,
            shipping_address,
            pricing,
            status,
            created_at,
        })
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn buyer_id(&self) -> BuyerId {
        self.buyer_id
    }

    pub fn shipping_address(&self) -> Option<&str> {
        self.shipping_address.as_deref()
    }

    pub fn pricing(&self) -> &OrderPricing {
        &self.pricing
    }

    pub fn total(&self) -> Money {
        self.pricing.total
    }

    /// Status exactly as stored.
    pub fn stored_status(&self) -> Option<OrderStatus> {
        self.status
    }

    /// Status with the legacy unset value resolved to `Processing`.
    pub fn status(&self) -> OrderStatus {
        OrderStatus::effective(self.status)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Copy of this order carrying a new status.
    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// One line of an order. Immutable once persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    id: OrderLineId,
    order_id: OrderId,
    position: u32,
    variant: VariantKey,
    quantity: u32,
    unit_price: Money,
}

impl OrderLine {
    pub fn new(
        id: OrderLineId,
        order_id: OrderId,
        position: u32,
        variant: VariantKey,
        quantity: u32,
        unit_price: Money,
    ) -> Result<Self, ValidationError> {
        let line = position as usize;
        if quantity == 0 {
            return Err(ValidationError::NonPositiveQuantity { line });
        }
        if unit_price.is_negative() {
            return Err(ValidationError::NegativePrice {
                line,
                cents: unit_price.cents(),
            });
        }
        if unit_price.checked_multiply(quantity).is_none() {
            return Err(ValidationError::AmountOverflow { line });
        }
        Ok(Self {
            id,
            order_id,
            position,
            variant,
            quantity,
            unit_price,
        })
    }

    pub fn id(&self) -> OrderLineId {
        self.id
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    /// 0-based position of the line within its order.
    pub fn position(&self) -> u32 {
        self.position
    }

    pub fn variant(&self) -> &VariantKey {
        &self.variant
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    /// `unit_price * quantity`; `new` guarantees the product fits.
    pub fn line_total(&self) -> Money {
        self.unit_price.saturating_multiply(self.quantity)
    }
}

/// An order with its lines, ready to be written in one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub order: Order,
    pub lines: Vec<OrderLine>,
}
