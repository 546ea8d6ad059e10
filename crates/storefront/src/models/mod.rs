//! Domain models for the storefront.
//!
//! These are validated domain types, separate from database row types.
//! Records reference each other by id; the data store owns all of them.

pub mod cart;
pub mod item;
pub mod order;
pub mod session;
pub mod user;

pub use cart::{CartEntry, CartLine, PurchasedEntry};
pub use item::{Item, ItemPage, ItemUpdate, NewItem};
pub use order::{NewOrder, NewOrderItem, Order, OrderItem};
pub use session::CurrentUser;
pub use user::{NewUser, User};
