use anyhow::{anyhow, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use mongodb::bson::{doc, Bson, Document};
use mongodb::{Collection, Database};

use crate::models::ParticipantBounds;

/// Read-only product lookups the session builder needs.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// `None` when the product does not exist.
    async fn participant_bounds(&self, product_id: &str) -> Result<Option<ParticipantBounds>>;
}

#[derive(Clone)]
pub struct MongoProductCatalog {
    collection: Collection<Document>,
}

impl MongoProductCatalog {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("products"),
        }
    }
}

fn as_u32(value: Option<&Bson>) -> Option<u32> {
    match value? {
        Bson::Int32(n) => u32::try_from(*n).ok(),
        Bson::Int64(n) => u32::try_from(*n).ok(),
        Bson::Double(n) if *n >= 0.0 && n.fract() == 0.0 => Some(*n as u32),
        _ => None,
    }
}

#[async_trait]
impl ProductCatalog for MongoProductCatalog {
    async fn participant_bounds(&self, product_id: &str) -> Result<Option<ParticipantBounds>> {
        let Some(product) = self
            .collection
            .find_one(doc! { "_id": product_id }, None)
            .await?
        else {
            return Ok(None);
        };

        let min = as_u32(product.get("min_participants")).unwrap_or(1);
        let max = as_u32(product.get("max_participants")).unwrap_or(u32::MAX);
        Ok(Some(ParticipantBounds { min, max }))
    }
}

#[derive(Default)]
pub struct InMemoryProductCatalog {
    products: DashMap<String, ParticipantBounds>,
}

impl InMemoryProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_product(self, product_id: &str, min: u32, max: u32) -> Self {
        self.insert(product_id, min, max);
        self
    }

    /// Parses `id:min:max` entries separated by commas. `min` and `max` may
    /// be omitted and default to one and unbounded.
    pub fn from_listing(listing: &str) -> Result<Self> {
        let catalog = Self::new();
        for entry in listing.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let mut parts = entry.split(':').map(str::trim);
            let id = parts.next().filter(|id| !id.is_empty()).ok_or_else(|| {
                anyhow!("Product entry '{}' has no id", entry)
            })?;
            let min = bound(parts.next(), 1, entry)?;
            let max = bound(parts.next(), u32::MAX, entry)?;
            if parts.next().is_some() || min == 0 || min > max {
                return Err(anyhow!("Product entry '{}' is invalid", entry));
            }
            catalog.insert(id, min, max);
        }
        if catalog.products.is_empty() {
            tracing::warn!("In-memory product catalog is empty; every order will be rejected");
        } else {
            tracing::info!(products = catalog.products.len(), "In-memory product catalog seeded");
        }
        Ok(catalog)
    }

    pub fn insert(&self, product_id: &str, min: u32, max: u32) {
        self.products
            .insert(product_id.to_string(), ParticipantBounds { min, max });
    }
}

fn bound(raw: Option<&str>, default: u32, entry: &str) -> Result<u32> {
    match raw {
        None | Some("") => Ok(default),
        Some(n) => n
            .parse()
            .map_err(|_| anyhow!("Product entry '{}' has a bad bound '{}'", entry, n)),
    }
}

#[async_trait]
impl ProductCatalog for InMemoryProductCatalog {
    async fn participant_bounds(&self, product_id: &str) -> Result<Option<ParticipantBounds>> {
        Ok(self.products.get(product_id).map(|b| *b.value()))
    }
}
