//! Durable storage ports for the client cart.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

use crate::models::CartItem;

/// Fixed key the cart is stored under.
pub const CART_STORAGE_KEY: &str = "cart-storage";

const CART_LAYOUT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum CartStorageError {
    #[error("Cart storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cart storage is not readable: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cart storage lock poisoned")]
    Poisoned,

    #[error("Invalid cart edit: {0}")]
    InvalidEdit(&'static str),
}

/// Read/write access to wherever the cart survives reloads.
pub trait CartPersistence: Send + Sync {
    fn load(&self) -> Result<Vec<CartItem>, CartStorageError>;
    fn save(&self, items: &[CartItem]) -> Result<(), CartStorageError>;
}

/// On-disk layout. Unknown fields are ignored so newer writers stay readable.
#[derive(Debug, Serialize, Deserialize)]
struct StoredCart {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    items: Vec<CartItem>,
}

fn default_version() -> u32 {
    CART_LAYOUT_VERSION
}

/// Stores the cart as a single JSON document named after [`CART_STORAGE_KEY`].
#[derive(Debug, Clone)]
pub struct JsonFileCartPersistence {
    path: PathBuf,
}

impl JsonFileCartPersistence {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", CART_STORAGE_KEY)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CartPersistence for JsonFileCartPersistence {
    fn load(&self) -> Result<Vec<CartItem>, CartStorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let stored: StoredCart = serde_json::from_str(&raw)?;
        if stored.version > CART_LAYOUT_VERSION {
            tracing::debug!(
                version = stored.version,
                "Reading cart written by a newer layout version"
            );
        }
        Ok(stored.items)
    }

    fn save(&self, items: &[CartItem]) -> Result<(), CartStorageError> {
        let stored = StoredCart {
            version: CART_LAYOUT_VERSION,
            items: items.to_vec(),
        };
        let json = serde_json::to_vec_pretty(&stored)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write-then-rename so a crash never leaves a half-written cart.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Volatile storage, used for carts submitted over HTTP and in tests.
#[derive(Debug, Default)]
pub struct MemoryCartPersistence {
    items: Mutex<Vec<CartItem>>,
    saves: Mutex<usize>,
}

impl MemoryCartPersistence {
    pub fn with_items(items: Vec<CartItem>) -> Self {
        Self {
            items: Mutex::new(items),
            saves: Mutex::new(0),
        }
    }

    /// Number of completed `save` calls.
    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|n| *n).unwrap_or(0)
    }
}

impl CartPersistence for MemoryCartPersistence {
    fn load(&self) -> Result<Vec<CartItem>, CartStorageError> {
        self.items
            .lock()
            .map(|items| items.clone())
            .map_err(|_| CartStorageError::Poisoned)
    }

    fn save(&self, items: &[CartItem]) -> Result<(), CartStorageError> {
        *self.items.lock().map_err(|_| CartStorageError::Poisoned)? = items.to_vec();
        *self.saves.lock().map_err(|_| CartStorageError::Poisoned)? += 1;
        Ok(())
    }
}

impl<T: CartPersistence + ?Sized> CartPersistence for std::sync::Arc<T> {
    fn load(&self) -> Result<Vec<CartItem>, CartStorageError> {
        (**self).load()
    }

    fn save(&self, items: &[CartItem]) -> Result<(), CartStorageError> {
        (**self).save(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn item(id: &str) -> CartItem {
        CartItem {
            product_id: id.to_string(),
            product_name: format!("Program {id}"),
            thumbnail: None,
            vendor_name: None,
            sale_price: 1_000,
            participants: 1,
            reservation_date: NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(),
            reservation_time: None,
            options: vec![],
        }
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileCartPersistence::in_dir(dir.path());
        assert!(storage.load().unwrap().is_empty());
    }

    #[test]
    fn file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        JsonFileCartPersistence::in_dir(dir.path())
            .save(&[item("a"), item("b")])
            .unwrap();

        let reopened = JsonFileCartPersistence::in_dir(dir.path());
        let items = reopened.load().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].product_id, "b");
        assert!(reopened.path().ends_with("cart-storage.json"));
    }

    #[test]
    fn reads_newer_layout_with_extra_fields() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileCartPersistence::in_dir(dir.path());
        fs::write(
            storage.path(),
            r#"{"version":2,"currency":"KRW","items":[{"productId":"a","salePrice":10,
               "participants":2,"reservationDate":"2026-11-02","coupon":null}]}"#,
        )
        .unwrap();

        let items = storage.load().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].line_total(), 20);
    }

    #[test]
    fn memory_counts_saves() {
        let storage = MemoryCartPersistence::default();
        storage.save(&[item("a")]).unwrap();
        storage.save(&[]).unwrap();
        assert_eq!(storage.save_count(), 2);
        assert!(storage.load().unwrap().is_empty());
    }
}
