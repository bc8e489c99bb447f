//! Value objects for the order domain.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Money amount represented in cents to avoid floating point issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Amount in cents (e.g., 1000 = $10.00)
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    /// Multiplies by a quantity, or `None` if the result does not fit.
    pub fn checked_multiply(&self, quantity: u32) -> Option<Money> {
        self.cents
            .checked_mul(i64::from(quantity))
            .map(Money::from_cents)
    }

    /// Multiplies by a quantity, clamping at the representable range.
    pub fn saturating_multiply(&self, quantity: u32) -> Money {
        Money {
            cents: self.cents.saturating_mul(i64::from(quantity)),
        }
    }

    /// Adds another amount, or `None` if the result does not fit.
    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.cents.checked_add(other.cents).map(Money::from_cents)
    }

    /// Subtracts another amount, never going below zero.
    pub fn saturating_sub(&self, other: Money) -> Money {
        Money {
            cents: self.cents.saturating_sub(other.cents).max(0),
        }
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Discount applied to an order subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Discount {
    /// A fixed amount off the subtotal.
    Fixed(Money),

    /// A whole-number percentage (0..=100) off the subtotal.
    Percentage(u32),
}

/// The kind of a discount, as persisted alongside its raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    Fixed,
    Percentage,
}

impl DiscountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountKind::Fixed => "fixed",
            DiscountKind::Percentage => "percentage",
        }
    }
}

impl std::str::FromStr for DiscountKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(DiscountKind::Fixed),
            "percentage" => Ok(DiscountKind::Percentage),
            other => Err(ValidationError::InvalidDiscount(format!(
                "unknown discount type '{other}'"
            ))),
        }
    }
}

impl Discount {
    /// Rebuilds a discount from its persisted kind and raw value.
    pub fn from_parts(kind: DiscountKind, value: i64) -> Result<Self, ValidationError> {
        let discount = match kind {
            DiscountKind::Fixed => Discount::Fixed(Money::from_cents(value)),
            DiscountKind::Percentage => Discount::Percentage(u32::try_from(value).map_err(
                |_| ValidationError::InvalidDiscount(format!("percentage {value} out of range")),
            )?),
        };
        discount.validate()?;
        Ok(discount)
    }

    pub fn kind(&self) -> DiscountKind {
        match self {
            Discount::Fixed(_) => DiscountKind::Fixed,
            Discount::Percentage(_) => DiscountKind::Percentage,
        }
    }

    /// Raw persisted value: cents for fixed discounts, percent for percentages.
    pub fn value(&self) -> i64 {
        match self {
            Discount::Fixed(amount) => amount.cents(),
            Discount::Percentage(pct) => i64::from(*pct),
        }
    }

    /// Checks the discount is well formed.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Discount::Fixed(amount) if amount.is_negative() => Err(
                ValidationError::InvalidDiscount(format!("fixed discount {amount} is negative")),
            ),
            Discount::Percentage(pct) if *pct > 100 => Err(ValidationError::InvalidDiscount(
                format!("percentage {pct} exceeds 100"),
            )),
            _ => Ok(()),
        }
    }

    /// Amount taken off `subtotal`, never more than the subtotal itself.
    ///
    /// Percentages round down to the cent and are computed in `i128`, so
    /// any subtotal is priced without overflow.
    pub fn amount_off(&self, subtotal: Money) -> Money {
        let off = match self {
            Discount::Fixed(amount) => *amount,
            Discount::Percentage(pct) => {
                let scaled = i128::from(subtotal.cents()) * i128::from(*pct) / 100;
                let capped = scaled.min(i128::from(subtotal.cents()));
                Money::from_cents(i64::try_from(capped).unwrap_or(subtotal.cents()))
            }
        };
        off.min(subtotal).max(Money::zero())
    }
}

/// Identity of whoever requested a status change.
///
/// Supplied by the operator UI; the core only requires it to be non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Actor(String);

impl Actor {
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyActor);
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_cents(1234).to_string(), "12.34");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-1234).to_string(), "-12.34");
    }

    #[test]
    fn test_money_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(1500);

        assert_eq!(a.checked_add(b), Some(Money::from_cents(2500)));
        assert_eq!(a.checked_multiply(3), Some(Money::from_cents(3000)));
        assert_eq!(a.saturating_sub(b), Money::zero());
        assert_eq!(b.saturating_sub(a).cents(), 500);
    }

    #[test]
    fn test_money_overflow_is_detected() {
        let huge = Money::from_cents(i64::MAX / 2 + 1);

        assert_eq!(huge.checked_multiply(2), None);
        assert_eq!(huge.checked_add(huge), None);
        assert_eq!(huge.saturating_multiply(2).cents(), i64::MAX);
        assert_eq!(Money::from_cents(i64::MIN).saturating_sub(huge), Money::zero());
    }

    #[test]
    fn test_percentage_of_huge_subtotal() {
        let subtotal = Money::from_cents(200_000_000_000_000_000);
        let off = Discount::Percentage(50).amount_off(subtotal);
        assert_eq!(off.cents(), 100_000_000_000_000_000);

        let max = Money::from_cents(i64::MAX);
        assert_eq!(Discount::Percentage(100).amount_off(max), max);
    }

    #[test]
    fn test_percentage_discount_rounds_down() {
        let discount = Discount::Percentage(15);
        assert_eq!(discount.amount_off(Money::from_cents(999)).cents(), 149);
    }

    #[test]
    fn test_fixed_discount_capped_at_subtotal() {
        let discount = Discount::Fixed(Money::from_cents(5000));
        assert_eq!(discount.amount_off(Money::from_cents(1200)).cents(), 1200);
    }

    #[test]
    fn test_discount_validation() {
        assert!(Discount::Percentage(100).validate().is_ok());
        assert!(Discount::Percentage(101).validate().is_err());
        assert!(Discount::Fixed(Money::from_cents(-1)).validate().is_err());
    }

    #[test]
    fn test_discount_from_parts() {
        let discount = Discount::from_parts(DiscountKind::Percentage, 20).unwrap();
        assert_eq!(discount, Discount::Percentage(20));
        assert_eq!(discount.kind().as_str(), "percentage");
        assert_eq!(discount.value(), 20);

        assert!(Discount::from_parts(DiscountKind::Percentage, -5).is_err());
        assert!("bogus".parse::<DiscountKind>().is_err());
    }

    #[test]
    fn test_discount_serialization() {
        let json = serde_json::to_value(Discount::Percentage(10)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "percentage", "value": 10}));
    }

    #[test]
    fn test_actor_requires_name() {
        assert!(Actor::new("ops@example.com").is_ok());
        assert!(matches!(Actor::new("   "), Err(ValidationError::EmptyActor)));
    }
}
