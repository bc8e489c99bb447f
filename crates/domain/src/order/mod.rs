//! Orders, carts and the status lifecycle.

mod aggregate;
mod cart;
mod history;
mod status;
mod value_objects;

pub use aggregate::{NewOrder, Order, OrderLine, OrderPricing};
pub use cart::{Cart, CartLine};
pub use history::StatusChange;
pub use status::{OrderStatus, TransitionKind};
pub use value_objects::{Actor, Discount, DiscountKind, Money};
