//! Shopping cart submitted for fulfillment.

use std::collections::HashSet;

use chrono::Utc;
use common::{BuyerId, OrderId, OrderLineId};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::stock::VariantKey;

use super::{Discount, Money, NewOrder, Order, OrderLine, OrderPricing, OrderStatus};

/// One requested variant and quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub variant: VariantKey,
    pub quantity: u32,
    pub unit_price: Money,
}

impl CartLine {
    pub fn new(variant: VariantKey, quantity: u32, unit_price: Money) -> Self {
        Self {
            variant,
            quantity,
            unit_price,
        }
    }
}

/// A checkout request: lines plus everything the order row records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub lines: Vec<CartLine>,
    pub shipping_address: Option<String>,
    pub discount: Option<Discount>,
    pub points_earned: Option<u32>,
    pub points_spent: Option<u32>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_line(mut self, line: CartLine) -> Self {
        self.lines.push(line);
        self
    }

    pub fn with_shipping_address(mut self, address: impl Into<String>) -> Self {
        self.shipping_address = Some(address.into());
        self
    }

    pub fn with_discount(mut self, discount: Discount) -> Self {
        self.discount = Some(discount);
        self
    }

    pub fn with_points(mut self, earned: Option<u32>, spent: Option<u32>) -> Self {
        self.points_earned = earned;
        self.points_spent = spent;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Checks the cart without touching storage.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.lines.is_empty() {
            return Err(ValidationError::EmptyCart);
        }

        let mut seen = HashSet::new();
        for (index, line) in self.lines.iter().enumerate() {
            if line.quantity == 0 {
                return Err(ValidationError::NonPositiveQuantity { line: index });
            }
            if line.unit_price.is_negative() {
                return Err(ValidationError::NegativePrice {
                    line: index,
                    cents: line.unit_price.cents(),
                });
            }
            // ledger movements are keyed by order and stock record
            if !seen.insert(&line.variant) {
                return Err(ValidationError::DuplicateVariant(line.variant.to_string()));
            }
        }

        if let Some(discount) = &self.discount {
            discount.validate()?;
        }
        Ok(())
    }

    /// Sum of line prices.
    ///
    /// Fails with `AmountOverflow` naming the first line whose total, or
    /// whose addition to the running sum, does not fit.
    pub fn subtotal(&self) -> Result<Money, ValidationError> {
        self.lines
            .iter()
            .enumerate()
            .try_fold(Money::zero(), |sum, (index, line)| {
                line.unit_price
                    .checked_multiply(line.quantity)
                    .and_then(|line_total| sum.checked_add(line_total))
                    .ok_or(ValidationError::AmountOverflow { line: index })
            })
    }

    pub fn pricing(&self) -> Result<OrderPricing, ValidationError> {
        Ok(OrderPricing::new(self.subtotal()?, self.discount)
            .with_points(self.points_earned, self.points_spent))
    }

    /// Validates the cart and turns it into a pending order with its lines.
    pub fn build(&self, buyer_id: BuyerId) -> Result<NewOrder, ValidationError> {
        self.validate()?;

        let order_id = OrderId::new();
        let order = Order::new(
            order_id,
            buyer_id,
            self.shipping_address.clone(),
            self.pricing()?,
            Some(OrderStatus::Pending),
            Utc::now(),
        )?;

        let lines = self
            .lines
            .iter()
            .enumerate()
            .map(|(position, line)| {
                OrderLine::new(
                    OrderLineId::new(),
                    order_id,
                    position as u32,
                    line.variant.clone(),
                    line.quantity,
                    line.unit_price,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(NewOrder { order, lines })
    }
}
