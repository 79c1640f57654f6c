//! Shared application state.
//!
//! One store handle, one collection namespace, one auth session. The
//! daemon initializes the process-wide context once; the CLI and tests
//! build private contexts instead.

use crate::auth::{AuthSession, DevAuth};
use crate::config::Config;
use presence_store::{CollectionStore, Collections, MemoryStore, SqliteStore, StoreError};
use std::sync::Arc;
use tokio::sync::OnceCell;

static CONTEXT: OnceCell<AppContext> = OnceCell::const_new();

#[derive(Clone)]
pub struct AppContext {
    pub config: Config,
    pub store: Arc<dyn CollectionStore>,
    pub collections: Collections,
    pub auth: Arc<AuthSession>,
}

impl AppContext {
    /// Build a standalone context. `db_path` selects the SQLite backend;
    /// without it everything lives in memory and dies with the process.
    pub async fn build(config: Config) -> Result<Self, StoreError> {
        let store: Arc<dyn CollectionStore> = match &config.db_path {
            Some(path) => {
                tracing::info!(path = %path.display(), "opening sqlite store");
                Arc::new(SqliteStore::open(path).await?)
            }
            None => {
                tracing::info!("using in-memory store");
                Arc::new(MemoryStore::new())
            }
        };
        let collections = Collections::new(&config.app_id);
        let auth = Arc::new(AuthSession::new(Arc::new(DevAuth::new(
            config.operator_email.clone(),
        ))));
        Ok(Self {
            config,
            store,
            collections,
            auth,
        })
    }

    /// Initialize the process-wide context. Idempotent; later calls get
    /// the first context and their config is ignored.
    pub async fn init(config: Config) -> Result<&'static Self, StoreError> {
        CONTEXT.get_or_try_init(|| Self::build(config)).await
    }

    pub fn get() -> Option<&'static Self> {
        CONTEXT.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_store::Fields;

    #[tokio::test]
    async fn test_build_defaults_to_memory_store() {
        let ctx = AppContext::build(Config::default()).await.unwrap();
        let id = ctx
            .store
            .create(&ctx.collections.students(), Fields::new())
            .await
            .unwrap();
        let listed = ctx.store.list(&ctx.collections.students()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
    }

    #[tokio::test]
    async fn test_contexts_are_isolated() {
        let a = AppContext::build(Config::default()).await.unwrap();
        let b = AppContext::build(Config::default()).await.unwrap();
        a.store
            .create(&a.collections.students(), Fields::new())
            .await
            .unwrap();
        assert!(b.store.list(&b.collections.students()).await.unwrap().is_empty());
    }
}
