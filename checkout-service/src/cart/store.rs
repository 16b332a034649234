use super::persistence::{CartPersistence, CartStorageError};
use crate::models::{CartItem, CartItemPatch};

/// Sum of every line's total.
pub fn compute_total(items: &[CartItem]) -> u64 {
    items
        .iter()
        .fold(0u64, |acc, item| acc.saturating_add(item.line_total()))
}

/// Client-held cart, one line per product.
///
/// Constructed once per client process and handed to whatever needs it; every
/// mutation is written through to `P` before the call returns.
#[derive(Debug)]
pub struct CartStore<P: CartPersistence> {
    items: Vec<CartItem>,
    persistence: P,
}

impl<P: CartPersistence> CartStore<P> {
    /// Restore the cart from `persistence`.
    ///
    /// Unreadable storage starts an empty cart instead of failing startup.
    pub fn load(persistence: P) -> Self {
        let items = match persistence.load() {
            Ok(items) => dedupe(items),
            Err(e) => {
                tracing::warn!(error = %e, "Stored cart unreadable, starting empty");
                Vec::new()
            }
        };
        Self { items, persistence }
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn get(&self, product_id: &str) -> Option<&CartItem> {
        self.items.iter().find(|i| i.product_id == product_id)
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn compute_total(&self) -> u64 {
        compute_total(&self.items)
    }

    /// Put `item` in the cart, overwriting any line for the same product.
    pub fn add_or_replace(&mut self, item: CartItem) -> Result<(), CartStorageError> {
        if item.participants == 0 {
            return Err(CartStorageError::InvalidEdit(ZERO_PARTICIPANTS));
        }
        let mut next = self.items.clone();
        match position(&next, &item.product_id) {
            Some(idx) => next[idx] = item,
            None => next.push(item),
        }
        self.commit(next)
    }

    /// Merge `patch` into the product's line. Unknown product is a no-op.
    pub fn update(&mut self, product_id: &str, patch: CartItemPatch) -> Result<(), CartStorageError> {
        if patch.participants == Some(0) {
            return Err(CartStorageError::InvalidEdit(ZERO_PARTICIPANTS));
        }
        let Some(idx) = self.position(product_id) else {
            return Ok(());
        };
        let mut next = self.items.clone();
        next[idx].apply(patch);
        self.commit(next)
    }

    /// Drop the product's line. Unknown product is a no-op.
    pub fn remove(&mut self, product_id: &str) -> Result<(), CartStorageError> {
        let Some(idx) = self.position(product_id) else {
            return Ok(());
        };
        let mut next = self.items.clone();
        next.remove(idx);
        self.commit(next)
    }

    pub fn clear(&mut self) -> Result<(), CartStorageError> {
        self.commit(Vec::new())
    }

    fn position(&self, product_id: &str) -> Option<usize> {
        position(&self.items, product_id)
    }

    /// Persists `next` and only then makes it the in-memory cart.
    fn commit(&mut self, next: Vec<CartItem>) -> Result<(), CartStorageError> {
        if let Err(e) = self.persistence.save(&next) {
            tracing::error!(error = %e, "Failed to persist cart");
            return Err(e);
        }
        self.items = next;
        Ok(())
    }
}

const ZERO_PARTICIPANTS: &str = "participants must be at least 1";

fn position(items: &[CartItem], product_id: &str) -> Option<usize> {
    items.iter().position(|i| i.product_id == product_id)
}

/// Keeps the last line per product, in first-seen order.
fn dedupe(items: Vec<CartItem>) -> Vec<CartItem> {
    let mut out: Vec<CartItem> = Vec::with_capacity(items.len());
    for item in items {
        match position(&out, &item.product_id) {
            Some(idx) => out[idx] = item,
            None => out.push(item),
        }
    }
    out
}
