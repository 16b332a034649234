//! Creates reservation records for an approved order.
//!
//! Confirmation is idempotent per order id: running it twice never creates a
//! second reservation for the same `(order_id, product_id)`.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{bson::doc, Collection, Database, IndexModel};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::models::{ApprovedPayment, CheckoutOrder, Reservation};

const DUPLICATE_KEY: i32 = 11000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializeOutcome {
    /// Number of reservations written by this call.
    Created(usize),
    AlreadyConfirmed,
}

impl MaterializeOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            MaterializeOutcome::Created(_) => "created",
            MaterializeOutcome::AlreadyConfirmed => "already_confirmed",
        }
    }
}

#[async_trait]
pub trait ReservationMaterializer: Send + Sync {
    async fn confirm(
        &self,
        order: &CheckoutOrder,
        payment: &ApprovedPayment,
    ) -> Result<MaterializeOutcome>;
}

#[derive(Clone)]
pub struct MongoReservationMaterializer {
    collection: Collection<Reservation>,
}

impl MongoReservationMaterializer {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("reservations"),
        }
    }

    pub async fn init_indexes(&self) -> Result<()> {
        let unique_line = IndexModel::builder()
            .keys(doc! { "order_id": 1, "product_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("reservation_order_product_unique".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        self.collection.create_index(unique_line, None).await?;
        tracing::info!("Reservation indexes initialized");
        Ok(())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY
    )
}

#[async_trait]
impl ReservationMaterializer for MongoReservationMaterializer {
    async fn confirm(
        &self,
        order: &CheckoutOrder,
        payment: &ApprovedPayment,
    ) -> Result<MaterializeOutcome> {
        let existing = self
            .collection
            .count_documents(doc! { "order_id": order.order_id() }, None)
            .await?;
        if existing as usize >= order.lines().len() {
            return Ok(MaterializeOutcome::AlreadyConfirmed);
        }

        let now = Utc::now();
        let mut created = 0;
        for line in order.lines() {
            let reservation = Reservation::confirmed(order.order_id(), &payment.tid, line, now);
            match self.collection.insert_one(&reservation, None).await {
                Ok(_) => created += 1,
                // A previous partial run already wrote this line.
                Err(e) if is_duplicate_key(&e) => {}
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!(
            order_id = %order.order_id(),
            created,
            "Reservations materialized"
        );
        Ok(if created == 0 {
            MaterializeOutcome::AlreadyConfirmed
        } else {
            MaterializeOutcome::Created(created)
        })
    }
}

/// Process-local reservations, keyed by `(order_id, product_id)`.
#[derive(Default)]
pub struct InMemoryReservationMaterializer {
    reservations: DashMap<(String, String), Reservation>,
    confirm_calls: DashMap<String, usize>,
    fail_next: AtomicUsize,
}

impl InMemoryReservationMaterializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` confirm calls fail before writing anything.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn reservations_for(&self, order_id: &str) -> Vec<Reservation> {
        let mut found: Vec<Reservation> = self
            .reservations
            .iter()
            .filter(|r| r.key().0 == order_id)
            .map(|r| r.value().clone())
            .collect();
        found.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        found
    }

    /// Number of confirm calls for `order_id` that created reservations.
    pub fn confirmations(&self, order_id: &str) -> usize {
        self.confirm_calls.get(order_id).map(|n| *n).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }
}

#[async_trait]
impl ReservationMaterializer for InMemoryReservationMaterializer {
    async fn confirm(
        &self,
        order: &CheckoutOrder,
        payment: &ApprovedPayment,
    ) -> Result<MaterializeOutcome> {
        let pending = self.fail_next.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_next.store(pending - 1, Ordering::SeqCst);
            anyhow::bail!("reservation store unavailable");
        }

        let now = Utc::now();
        let mut created = 0;
        for line in order.lines() {
            let key = (order.order_id().to_string(), line.product_id.clone());
            self.reservations.entry(key).or_insert_with(|| {
                created += 1;
                Reservation::confirmed(order.order_id(), &payment.tid, line, now)
            });
        }

        if created == 0 {
            return Ok(MaterializeOutcome::AlreadyConfirmed);
        }
        *self
            .confirm_calls
            .entry(order.order_id().to_string())
            .or_insert(0) += 1;
        Ok(MaterializeOutcome::Created(created))
    }
}
