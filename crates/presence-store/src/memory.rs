//! In-memory collection store. Default backend for tests and local runs.

use crate::{
    resolve_server_timestamps, ChangeFeed, CollectionStore, Document, Fields, StoreError,
    Subscription,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use uuid::Uuid;

pub struct MemoryStore {
    collections: Mutex<HashMap<String, BTreeMap<String, Fields>>>,
    feed: ChangeFeed,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            feed: ChangeFeed::new(),
        }
    }

    fn snapshot(&self, path: &str) -> Vec<Document> {
        snapshot_of(
            self.collections
                .lock()
                .expect("memory store lock poisoned")
                .get(path),
        )
    }

    /// Apply a mutation and publish the resulting full set while holding
    /// the collection lock, so subscribers see sets in write order.
    fn mutate(
        &self,
        path: &str,
        op: impl FnOnce(&mut BTreeMap<String, Fields>) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.lock().expect("memory store lock poisoned");
        let docs = collections.entry(path.to_string()).or_default();
        op(docs)?;
        self.feed.publish(path, snapshot_of(Some(docs)));
        Ok(())
    }
}

fn snapshot_of(docs: Option<&BTreeMap<String, Fields>>) -> Vec<Document> {
    docs.map(|docs| {
        docs.iter()
            .map(|(id, fields)| Document {
                id: id.clone(),
                fields: fields.clone(),
            })
            .collect()
    })
    .unwrap_or_default()
}

#[async_trait]
impl CollectionStore for MemoryStore {
    async fn list(&self, path: &str) -> Result<Vec<Document>, StoreError> {
        Ok(self.snapshot(path))
    }

    async fn create(&self, path: &str, mut fields: Fields) -> Result<String, StoreError> {
        resolve_server_timestamps(&mut fields);
        let id = Uuid::new_v4().to_string();
        self.mutate(path, |docs| {
            docs.insert(id.clone(), fields);
            Ok(())
        })?;
        Ok(id)
    }

    async fn put(&self, path: &str, id: &str, mut fields: Fields) -> Result<(), StoreError> {
        resolve_server_timestamps(&mut fields);
        self.mutate(path, |docs| {
            docs.insert(id.to_string(), fields);
            Ok(())
        })
    }

    async fn update(&self, path: &str, id: &str, mut partial: Fields) -> Result<(), StoreError> {
        resolve_server_timestamps(&mut partial);
        self.mutate(path, |docs| {
            let doc = docs.get_mut(id).ok_or_else(|| StoreError::NotFound {
                collection: path.to_string(),
                id: id.to_string(),
            })?;
            for (key, value) in partial {
                doc.insert(key, value);
            }
            Ok(())
        })
    }

    async fn delete(&self, path: &str, id: &str) -> Result<(), StoreError> {
        self.mutate(path, |docs| {
            docs.remove(id);
            Ok(())
        })
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError> {
        // Receiver and initial set are taken under the collection lock so
        // no write can slip between them.
        let collections = self.collections.lock().expect("memory store lock poisoned");
        let rx = self.feed.receiver(path);
        Ok(Subscription::new(snapshot_of(collections.get(path)), rx))
    }
}
