//! Persisted records and their API views.

pub mod order;
pub mod store;
pub mod user;

pub use order::{NewOrder, Order, OrderFilter, OrderUpdate, Page};
pub use store::{NewStore, Store, StoreView};
pub use user::{User, UserCredentials};
