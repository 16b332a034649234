//! Reservation booking constraints with a bounded cache.

use anyhow::Result;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::{Collection, Database};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

pub const ADVANCE_DAYS_KEY: &str = "advance_booking_days";
pub const MIN_NOTICE_HOURS_KEY: &str = "min_notice_hours";

const DEFAULT_ADVANCE_DAYS: u32 = 90;
const DEFAULT_MIN_NOTICE_HOURS: u32 = 0;

/// How far ahead and how soon a program may be booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationSettings {
    pub advance_days: u32,
    pub min_notice_hours: u32,
}

impl Default for ReservationSettings {
    fn default() -> Self {
        Self {
            advance_days: DEFAULT_ADVANCE_DAYS,
            min_notice_hours: DEFAULT_MIN_NOTICE_HOURS,
        }
    }
}

impl ReservationSettings {
    /// Builds settings from raw rows, keeping the default for any field whose
    /// value is missing or not a non-negative integer.
    pub fn from_rows(rows: &HashMap<String, String>) -> Self {
        let defaults = Self::default();
        Self {
            advance_days: parse_field(rows, ADVANCE_DAYS_KEY).unwrap_or(defaults.advance_days),
            min_notice_hours: parse_field(rows, MIN_NOTICE_HOURS_KEY)
                .unwrap_or(defaults.min_notice_hours),
        }
    }
}

fn parse_field(rows: &HashMap<String, String>, key: &str) -> Option<u32> {
    let raw = rows.get(key)?;
    match raw.trim().parse::<u32>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring malformed reservation setting");
            None
        }
    }
}

/// Where the raw key/value policy rows come from.
#[async_trait]
pub trait PolicySource: Send + Sync {
    async fn fetch(&self) -> Result<HashMap<String, String>>;
}

pub struct ReservationPolicyService {
    source: Arc<dyn PolicySource>,
    ttl: Duration,
    cache: RwLock<Option<(Instant, ReservationSettings)>>,
}

impl ReservationPolicyService {
    pub fn new(source: Arc<dyn PolicySource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cache: RwLock::new(None),
        }
    }

    /// Current settings. Never fails: an unreachable source yields defaults,
    /// and that fallback is not cached.
    pub async fn get_settings(&self) -> ReservationSettings {
        if let Some((fetched_at, settings)) = *self.cache.read().await {
            if fetched_at.elapsed() < self.ttl {
                return settings;
            }
        }

        let mut cache = self.cache.write().await;
        // Another caller may have refreshed while we waited for the lock.
        if let Some((fetched_at, settings)) = *cache {
            if fetched_at.elapsed() < self.ttl {
                return settings;
            }
        }

        match self.source.fetch().await {
            Ok(rows) => {
                let settings = ReservationSettings::from_rows(&rows);
                tracing::debug!(
                    advance_days = settings.advance_days,
                    min_notice_hours = settings.min_notice_hours,
                    "Reservation settings refreshed"
                );
                *cache = Some((Instant::now(), settings));
                settings
            }
            Err(e) => {
                tracing::warn!(error = %e, "Reservation settings unavailable, using defaults");
                ReservationSettings::default()
            }
        }
    }

    /// Drops the cached value so the next call hits the source.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }
}

/// Reads `{ key, value }` rows from the `reservation_settings` collection.
#[derive(Clone)]
pub struct MongoPolicySource {
    collection: Collection<Document>,
}

impl MongoPolicySource {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("reservation_settings"),
        }
    }
}

#[async_trait]
impl PolicySource for MongoPolicySource {
    async fn fetch(&self) -> Result<HashMap<String, String>> {
        let filter = doc! { "key": { "$in": [ADVANCE_DAYS_KEY, MIN_NOTICE_HOURS_KEY] } };
        let docs: Vec<Document> = self.collection.find(filter, None).await?.try_collect().await?;

        let mut rows = HashMap::new();
        for row in docs {
            let Ok(key) = row.get_str("key") else {
                continue;
            };
            let value = match row.get("value") {
                Some(Bson::String(s)) => s.clone(),
                Some(Bson::Int32(n)) => n.to_string(),
                Some(Bson::Int64(n)) => n.to_string(),
                Some(Bson::Double(n)) if n.fract() == 0.0 => format!("{}", *n as i64),
                Some(other) => other.to_string(),
                None => continue,
            };
            rows.insert(key.to_string(), value);
        }
        Ok(rows)
    }
}

/// Fixed rows, with a switch to simulate an unreachable source.
#[derive(Default)]
pub struct InMemoryPolicySource {
    rows: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
    fetches: AtomicUsize,
}

impl InMemoryPolicySource {
    pub fn new(rows: &[(&str, &str)]) -> Self {
        let source = Self::default();
        source.set_rows(rows);
        source
    }

    pub fn set_rows(&self, rows: &[(&str, &str)]) {
        if let Ok(mut guard) = self.rows.lock() {
            *guard = rows
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PolicySource for InMemoryPolicySource {
    async fn fetch(&self) -> Result<HashMap<String, String>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("policy source unreachable");
        }
        self.rows
            .lock()
            .map(|rows| rows.clone())
            .map_err(|_| anyhow::anyhow!("policy rows lock poisoned"))
    }
}
