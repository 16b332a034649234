//! Client-side cart: an owned store with a pluggable persistence port.
pub mod persistence;
pub mod store;

pub use persistence::{
    CartPersistence, CartStorageError, JsonFileCartPersistence, MemoryCartPersistence,
    CART_STORAGE_KEY,
};
pub use store::{compute_total, CartStore};
