//! presence-store — Document persistence with realtime change subscriptions.
//!
//! Models the external document database the tracker runs against: named
//! collections of schemaless JSON documents, single-document atomic writes,
//! a server-assigned timestamp sentinel, and subscriptions that push the
//! full current item set on every change.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;

/// Sentinel field value resolved by the store, at write time, to the
/// store's current UTC instant (RFC 3339). Client clocks never supply
/// persisted timestamps.
pub const SERVER_TIMESTAMP: &str = "$serverTimestamp";

/// Schemaless document body.
pub type Fields = serde_json::Map<String, serde_json::Value>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },
    #[error("storage backend: {0}")]
    Backend(String),
}

impl From<tokio_rusqlite::Error> for StoreError {
    fn from(e: tokio_rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// A stored document with its collection-unique id.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(|v| v.as_i64())
    }
}

/// A live feed of one collection. The full current item set is pushed
/// immediately on subscribe and again after every change.
pub struct Subscription {
    initial: Option<Vec<Document>>,
    rx: broadcast::Receiver<Vec<Document>>,
}

impl Subscription {
    fn new(initial: Vec<Document>, rx: broadcast::Receiver<Vec<Document>>) -> Self {
        Self {
            initial: Some(initial),
            rx,
        }
    }

    /// Next item set, or `None` once the store side is gone. A lagged
    /// receiver skips straight to the most recent set; every push carries
    /// the full collection, so intermediate sets are redundant.
    pub async fn recv(&mut self) -> Option<Vec<Document>> {
        if let Some(initial) = self.initial.take() {
            return Some(initial);
        }
        loop {
            match self.rx.recv().await {
                Ok(items) => return Some(items),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscription lagged; catching up");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Generic collection store: read, write, delete, change subscription.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// All documents in the collection, ordered by id.
    async fn list(&self, path: &str) -> Result<Vec<Document>, StoreError>;

    /// Atomically create one document with a store-generated id.
    async fn create(&self, path: &str, fields: Fields) -> Result<String, StoreError>;

    /// Full replace; creates the document if it does not exist.
    async fn put(&self, path: &str, id: &str, fields: Fields) -> Result<(), StoreError>;

    /// Merge partial fields into an existing document.
    async fn update(&self, path: &str, id: &str, partial: Fields) -> Result<(), StoreError>;

    async fn delete(&self, path: &str, id: &str) -> Result<(), StoreError>;

    /// Subscribe to the collection's full item set.
    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError>;
}

/// Collection paths for one application tenant, mirroring the
/// `artifacts/{app}/public/data/{name}` namespace the data lives under.
#[derive(Debug, Clone)]
pub struct Collections {
    app_id: String,
}

impl Collections {
    pub fn new(app_id: &str) -> Self {
        Self {
            app_id: app_id.to_string(),
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn students(&self) -> String {
        self.path("students")
    }

    pub fn logs(&self) -> String {
        self.path("logs")
    }

    pub fn users(&self) -> String {
        self.path("users")
    }

    fn path(&self, name: &str) -> String {
        format!("artifacts/{}/public/data/{name}", self.app_id)
    }
}

/// Replace every top-level [`SERVER_TIMESTAMP`] sentinel with the current
/// UTC instant. Shared by the store backends; runs inside the write.
pub(crate) fn resolve_server_timestamps(fields: &mut Fields) {
    let now = chrono::Utc::now().to_rfc3339();
    for value in fields.values_mut() {
        if value.as_str() == Some(SERVER_TIMESTAMP) {
            *value = serde_json::Value::String(now.clone());
        }
    }
}

/// Per-collection broadcast fan-out shared by the backends.
pub(crate) struct ChangeFeed {
    senders: Mutex<HashMap<String, broadcast::Sender<Vec<Document>>>>,
}

impl ChangeFeed {
    pub(crate) fn new() -> Self {
        Self {
            senders: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn receiver(&self, path: &str) -> broadcast::Receiver<Vec<Document>> {
        self.sender(path).subscribe()
    }

    /// Push the full item set to current subscribers. Send errors just
    /// mean nobody is listening.
    pub(crate) fn publish(&self, path: &str, items: Vec<Document>) {
        let _ = self.sender(path).send(items);
    }

    fn sender(&self, path: &str) -> broadcast::Sender<Vec<Document>> {
        self.senders
            .lock()
            .expect("change feed lock poisoned")
            .entry(path.to_string())
            .or_insert_with(|| broadcast::channel(16).0)
            .clone()
    }
}
