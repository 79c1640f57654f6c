//! SQLite-backed collection store.
//!
//! One `documents` table keyed by (collection, id) with JSON bodies;
//! change notifications fan out through the same broadcast feed as the
//! in-memory backend. Each write snapshots and publishes on the
//! connection thread, which serializes all writes, so subscribers see
//! item sets in write order.

use crate::{
    resolve_server_timestamps, ChangeFeed, CollectionStore, Document, Fields, StoreError,
    Subscription,
};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio_rusqlite::Connection;
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    id         TEXT NOT NULL,
    fields     TEXT NOT NULL,
    PRIMARY KEY (collection, id)
)";

pub struct SqliteStore {
    conn: Connection,
    feed: Arc<ChangeFeed>,
}

impl SqliteStore {
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).await?;
        tracing::info!(path = %path.display(), "opened sqlite store");
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self {
            conn,
            feed: Arc::new(ChangeFeed::new()),
        })
    }

    async fn snapshot(&self, path: &str) -> Result<Vec<Document>, StoreError> {
        let collection = path.to_string();
        Ok(self
            .conn
            .call(move |conn| collection_snapshot(conn, &collection))
            .await?)
    }
}

/// Full item set for one collection, read on the connection thread.
fn collection_snapshot(
    conn: &rusqlite::Connection,
    collection: &str,
) -> Result<Vec<Document>, tokio_rusqlite::Error> {
    let mut stmt =
        conn.prepare("SELECT id, fields FROM documents WHERE collection = ?1 ORDER BY id")?;
    let rows = stmt
        .query_map([collection], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<(String, String)>, _>>()?;

    rows.into_iter()
        .map(|(id, body)| {
            let fields = serde_json::from_str(&body)
                .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
            Ok(Document { id, fields })
        })
        .collect()
}

fn publish_current(
    conn: &rusqlite::Connection,
    feed: &ChangeFeed,
    collection: &str,
) -> Result<(), tokio_rusqlite::Error> {
    let items = collection_snapshot(conn, collection)?;
    feed.publish(collection, items);
    Ok(())
}

#[async_trait]
impl CollectionStore for SqliteStore {
    async fn list(&self, path: &str) -> Result<Vec<Document>, StoreError> {
        self.snapshot(path).await
    }

    async fn create(&self, path: &str, mut fields: Fields) -> Result<String, StoreError> {
        resolve_server_timestamps(&mut fields);
        let id = Uuid::new_v4().to_string();
        let collection = path.to_string();
        let doc_id = id.clone();
        let body = serde_json::to_string(&fields)?;
        let feed = self.feed.clone();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO documents (collection, id, fields) VALUES (?1, ?2, ?3)",
                    (collection.as_str(), doc_id.as_str(), body.as_str()),
                )?;
                publish_current(conn, &feed, &collection)
            })
            .await?;
        Ok(id)
    }

    async fn put(&self, path: &str, id: &str, mut fields: Fields) -> Result<(), StoreError> {
        resolve_server_timestamps(&mut fields);
        let collection = path.to_string();
        let doc_id = id.to_string();
        let body = serde_json::to_string(&fields)?;
        let feed = self.feed.clone();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO documents (collection, id, fields) VALUES (?1, ?2, ?3)",
                    (collection.as_str(), doc_id.as_str(), body.as_str()),
                )?;
                publish_current(conn, &feed, &collection)
            })
            .await?;
        Ok(())
    }

    async fn update(&self, path: &str, id: &str, mut partial: Fields) -> Result<(), StoreError> {
        resolve_server_timestamps(&mut partial);
        let collection = path.to_string();
        let doc_id = id.to_string();
        let feed = self.feed.clone();

        let found = self
            .conn
            .call(move |conn| {
                let existing: Option<String> = conn
                    .query_row(
                        "SELECT fields FROM documents WHERE collection = ?1 AND id = ?2",
                        (collection.as_str(), doc_id.as_str()),
                        |row| row.get(0),
                    )
                    .map(Some)
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(other),
                    })?;

                let Some(body) = existing else {
                    return Ok(false);
                };

                let mut fields: Fields = serde_json::from_str(&body)
                    .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
                for (key, value) in partial {
                    fields.insert(key, value);
                }
                let merged = serde_json::to_string(&fields)
                    .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;

                conn.execute(
                    "UPDATE documents SET fields = ?3 WHERE collection = ?1 AND id = ?2",
                    (collection.as_str(), doc_id.as_str(), merged.as_str()),
                )?;
                publish_current(conn, &feed, &collection)?;
                Ok(true)
            })
            .await?;

        if !found {
            return Err(StoreError::NotFound {
                collection: path.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete(&self, path: &str, id: &str) -> Result<(), StoreError> {
        let collection = path.to_string();
        let doc_id = id.to_string();
        let feed = self.feed.clone();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                    (collection.as_str(), doc_id.as_str()),
                )?;
                publish_current(conn, &feed, &collection)
            })
            .await?;
        Ok(())
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError> {
        let collection = path.to_string();
        let feed = self.feed.clone();
        // Receiver and initial set come from one connection-thread turn
        // so no write can slip between them.
        let (initial, rx) = self
            .conn
            .call(move |conn| {
                let rx = feed.receiver(&collection);
                let initial = collection_snapshot(conn, &collection)?;
                Ok((initial, rx))
            })
            .await?;
        Ok(Subscription::new(initial, rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::from(*v)))
            .collect()
    }

    #[tokio::test]
    async fn test_round_trip() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let id = store
            .create("students", fields(&[("name", "Ana"), ("class", "7A")]))
            .await
            .unwrap();

        let docs = store.list("students").await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, id);
        assert_eq!(docs[0].get_str("class"), Some("7A"));
    }

    #[tokio::test]
    async fn test_update_merges() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let id = store
            .create("users", fields(&[("email", "a@b.test"), ("role", "teacher")]))
            .await
            .unwrap();

        store
            .update("users", &id, fields(&[("role", "admin")]))
            .await
            .unwrap();

        let docs = store.list("users").await.unwrap();
        assert_eq!(docs[0].get_str("role"), Some("admin"));
        assert_eq!(docs[0].get_str("email"), Some("a@b.test"));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let err = store
            .update("users", "missing", fields(&[("role", "admin")]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_and_subscribe() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let id = store
            .create("students", fields(&[("name", "Ana")]))
            .await
            .unwrap();

        let mut sub = store.subscribe("students").await.unwrap();
        assert_eq!(sub.recv().await.unwrap().len(), 1);

        store.delete("students", &id).await.unwrap();
        assert_eq!(sub.recv().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_writers_publish_in_write_order() {
        let store = std::sync::Arc::new(SqliteStore::open_in_memory().await.unwrap());
        let mut sub = store.subscribe("students").await.unwrap();
        assert_eq!(sub.recv().await.unwrap().len(), 0);

        let writers: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let name = format!("student-{i}");
                    store
                        .create("students", fields(&[("name", &name)]))
                        .await
                        .unwrap();
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        let mut seen = 0;
        for _ in 0..8 {
            let set = sub.recv().await.unwrap();
            assert!(set.len() > seen, "stale item set delivered out of order");
            seen = set.len();
        }
        assert_eq!(seen, 8);
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store
            .create("students", fields(&[("name", "Ana")]))
            .await
            .unwrap();
        assert!(store.list("logs").await.unwrap().is_empty());
    }
}
