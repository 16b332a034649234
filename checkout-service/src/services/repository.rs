//! Checkout order storage.
//!
//! The checkout record is the system's own copy of a frozen order; settlement
//! matches provider transactions against it by order id.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use mongodb::options::IndexOptions;
use mongodb::{bson::doc, Collection, Database, IndexModel};

use crate::models::CheckoutRecord;

#[async_trait]
pub trait CheckoutOrderStore: Send + Sync {
    /// Insert a new record. Fails if the order id is already taken.
    async fn insert(&self, record: &CheckoutRecord) -> Result<()>;
    async fn get(&self, order_id: &str) -> Result<Option<CheckoutRecord>>;
    /// The order a provider transaction id is bound to, if any.
    async fn find_by_tid(&self, tid: &str) -> Result<Option<CheckoutRecord>>;
    /// Replace the stored record with `record`.
    ///
    /// Fails if `record.tid` is already bound to a different order.
    async fn save(&self, record: &CheckoutRecord) -> Result<()>;
}

#[derive(Clone)]
pub struct MongoCheckoutOrderStore {
    collection: Collection<CheckoutRecord>,
}

impl MongoCheckoutOrderStore {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("checkout_orders"),
        }
    }

    /// Initialize indexes used by status sweeps and tid lookups.
    pub async fn init_indexes(&self) -> Result<()> {
        let state_index = IndexModel::builder()
            .keys(doc! { "state": 1, "expires_at": 1 })
            .options(
                IndexOptions::builder()
                    .name("checkout_state_expiry_idx".to_string())
                    .build(),
            )
            .build();

        let tid_index = IndexModel::builder()
            .keys(doc! { "tid": 1 })
            .options(
                IndexOptions::builder()
                    .name("checkout_tid_idx".to_string())
                    .unique(true)
                    .sparse(true)
                    .build(),
            )
            .build();

        self.collection
            .create_indexes([state_index, tid_index], None)
            .await?;

        tracing::info!("Checkout order indexes initialized");
        Ok(())
    }
}

#[async_trait]
impl CheckoutOrderStore for MongoCheckoutOrderStore {
    async fn insert(&self, record: &CheckoutRecord) -> Result<()> {
        self.collection.insert_one(record, None).await?;
        Ok(())
    }

    async fn get(&self, order_id: &str) -> Result<Option<CheckoutRecord>> {
        let filter = doc! { "_id": order_id };
        Ok(self.collection.find_one(filter, None).await?)
    }

    async fn find_by_tid(&self, tid: &str) -> Result<Option<CheckoutRecord>> {
        Ok(self.collection.find_one(doc! { "tid": tid }, None).await?)
    }

    async fn save(&self, record: &CheckoutRecord) -> Result<()> {
        let filter = doc! { "_id": &record.order_id };
        let result = self.collection.replace_one(filter, record, None).await?;
        if result.matched_count == 0 {
            return Err(anyhow!("Checkout order {} vanished before save", record.order_id));
        }
        Ok(())
    }
}

/// Process-local store for tests and `CHECKOUT_STORAGE_BACKEND=memory`.
#[derive(Default)]
pub struct InMemoryCheckoutOrderStore {
    records: DashMap<String, CheckoutRecord>,
    /// tid -> order id, unique like the Mongo index.
    tids: DashMap<String, String>,
}

impl InMemoryCheckoutOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl CheckoutOrderStore for InMemoryCheckoutOrderStore {
    async fn insert(&self, record: &CheckoutRecord) -> Result<()> {
        use dashmap::mapref::entry::Entry;
        match self.records.entry(record.order_id.clone()) {
            Entry::Occupied(_) => Err(anyhow!("Checkout order {} already exists", record.order_id)),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, order_id: &str) -> Result<Option<CheckoutRecord>> {
        Ok(self.records.get(order_id).map(|r| r.value().clone()))
    }

    async fn find_by_tid(&self, tid: &str) -> Result<Option<CheckoutRecord>> {
        let Some(order_id) = self.tids.get(tid).map(|o| o.value().clone()) else {
            return Ok(None);
        };
        self.get(&order_id).await
    }

    async fn save(&self, record: &CheckoutRecord) -> Result<()> {
        use dashmap::mapref::entry::Entry;
        let Some(mut existing) = self.records.get_mut(&record.order_id) else {
            return Err(anyhow!("Checkout order {} vanished before save", record.order_id));
        };

        if existing.tid != record.tid {
            if let Some(tid) = record.tid.as_deref() {
                match self.tids.entry(tid.to_string()) {
                    Entry::Occupied(bound) if bound.get() != &record.order_id => {
                        return Err(anyhow!(
                            "Transaction {} is already bound to order {}",
                            tid,
                            bound.get()
                        ));
                    }
                    Entry::Occupied(_) => {}
                    Entry::Vacant(slot) => {
                        slot.insert(record.order_id.clone());
                    }
                }
            }
            if let Some(previous) = existing.tid.as_deref() {
                self.tids
                    .remove_if(previous, |_, order_id| order_id == &record.order_id);
            }
        }

        *existing = record.clone();
        Ok(())
    }
}
