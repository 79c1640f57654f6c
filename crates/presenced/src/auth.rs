//! Operator sign-in and role resolution.
//!
//! The identity provider is an external collaborator behind
//! [`AuthProvider`]. The only automatic retry in the whole system lives
//! here: a failed custom-token sign-in falls back to anonymous sign-in.

use crate::wire;
use async_trait::async_trait;
use presence_core::{Operator, Role};
use presence_store::{CollectionStore, Collections};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("sign-in failed: {0}")]
    SignInFailed(String),
    #[error("sign-out failed: {0}")]
    SignOutFailed(String),
}

/// A signed-in identity as reported by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
}

/// External authentication provider seam.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in_custom(&self, token: &str) -> Result<Identity, AuthError>;
    async fn sign_in_anonymous(&self) -> Result<Identity, AuthError>;
    async fn sign_out(&self) -> Result<(), AuthError>;
}

/// Development provider: accepts any non-empty custom token and mints
/// anonymous uids locally.
pub struct DevAuth {
    operator_email: Option<String>,
}

impl DevAuth {
    pub fn new(operator_email: Option<String>) -> Self {
        Self { operator_email }
    }
}

#[async_trait]
impl AuthProvider for DevAuth {
    async fn sign_in_custom(&self, token: &str) -> Result<Identity, AuthError> {
        if token.is_empty() {
            return Err(AuthError::SignInFailed("empty custom token".into()));
        }
        Ok(Identity {
            uid: format!("op-{token}"),
            email: self.operator_email.clone(),
        })
    }

    async fn sign_in_anonymous(&self) -> Result<Identity, AuthError> {
        Ok(Identity {
            uid: Uuid::new_v4().to_string(),
            email: None,
        })
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Process-scoped session over a provider, with identity-change
/// notifications for screens that need to react to sign-in state.
pub struct AuthSession {
    provider: Arc<dyn AuthProvider>,
    identity: watch::Sender<Option<Identity>>,
}

impl AuthSession {
    pub fn new(provider: Arc<dyn AuthProvider>) -> Self {
        Self {
            provider,
            identity: watch::channel(None).0,
        }
    }

    /// Sign in, preferring the custom token when present. A custom-token
    /// failure logs and falls back to anonymous; an anonymous failure is
    /// surfaced.
    pub async fn sign_in(&self, custom_token: Option<&str>) -> Result<Identity, AuthError> {
        if let Some(token) = custom_token {
            match self.provider.sign_in_custom(token).await {
                Ok(identity) => {
                    self.identity.send_replace(Some(identity.clone()));
                    return Ok(identity);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "custom token sign-in failed; falling back to anonymous");
                }
            }
        }
        let identity = self.provider.sign_in_anonymous().await?;
        self.identity.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    pub fn current(&self) -> Option<Identity> {
        self.identity.borrow().clone()
    }

    pub fn current_operator_email(&self) -> Option<String> {
        self.identity.borrow().as_ref().and_then(|i| i.email.clone())
    }

    pub fn on_identity_change(&self) -> watch::Receiver<Option<Identity>> {
        self.identity.subscribe()
    }

    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.provider.sign_out().await?;
        self.identity.send_replace(None);
        Ok(())
    }
}

/// Resolves a signed-in identity to an operator via the users collection.
pub struct OperatorDirectory {
    store: Arc<dyn CollectionStore>,
    users_path: String,
}

impl OperatorDirectory {
    pub fn new(store: Arc<dyn CollectionStore>, collections: &Collections) -> Self {
        Self {
            store,
            users_path: collections.users(),
        }
    }

    /// Operator for the identity. Absent a stored record (or on a read
    /// failure) the identity defaults to the teacher role; nothing is
    /// written back.
    pub async fn resolve(&self, identity: &Identity) -> Operator {
        let fallback = Operator {
            email: identity.email.clone().unwrap_or_else(|| "Unknown".to_string()),
            role: Role::Teacher,
        };

        let docs = match self.store.list(&self.users_path).await {
            Ok(docs) => docs,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load user record; defaulting to teacher");
                return fallback;
            }
        };

        match docs.iter().find(|d| d.id == identity.uid) {
            Some(doc) => match wire::user_from_doc(doc) {
                Ok(user) => Operator {
                    email: user.email,
                    role: user.role,
                },
                Err(e) => {
                    tracing::warn!(error = %e, "malformed user record; defaulting to teacher");
                    fallback
                }
            },
            None => fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedProvider {
        custom_fails: bool,
        custom_calls: AtomicUsize,
        anonymous_calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(custom_fails: bool) -> Self {
            Self {
                custom_fails,
                custom_calls: AtomicUsize::new(0),
                anonymous_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AuthProvider for ScriptedProvider {
        async fn sign_in_custom(&self, token: &str) -> Result<Identity, AuthError> {
            self.custom_calls.fetch_add(1, Ordering::SeqCst);
            if self.custom_fails {
                return Err(AuthError::SignInFailed("rejected".into()));
            }
            Ok(Identity {
                uid: format!("custom-{token}"),
                email: Some("teacher@school.test".into()),
            })
        }

        async fn sign_in_anonymous(&self) -> Result<Identity, AuthError> {
            self.anonymous_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Identity {
                uid: "anon".into(),
                email: None,
            })
        }

        async fn sign_out(&self) -> Result<(), AuthError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_custom_token_preferred() {
        let provider = Arc::new(ScriptedProvider::new(false));
        let session = AuthSession::new(provider.clone());

        let identity = session.sign_in(Some("tok")).await.unwrap();
        assert_eq!(identity.uid, "custom-tok");
        assert_eq!(provider.anonymous_calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            session.current_operator_email().as_deref(),
            Some("teacher@school.test")
        );
    }

    #[tokio::test]
    async fn test_custom_failure_falls_back_to_anonymous_once() {
        let provider = Arc::new(ScriptedProvider::new(true));
        let session = AuthSession::new(provider.clone());

        let identity = session.sign_in(Some("tok")).await.unwrap();
        assert_eq!(identity.uid, "anon");
        assert_eq!(provider.custom_calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.anonymous_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sign_out_clears_identity() {
        let session = AuthSession::new(Arc::new(ScriptedProvider::new(false)));
        let mut changes = session.on_identity_change();

        session.sign_in(None).await.unwrap();
        changes.changed().await.unwrap();
        assert!(session.current().is_some());

        session.sign_out().await.unwrap();
        changes.changed().await.unwrap();
        assert!(session.current().is_none());
    }

    #[tokio::test]
    async fn test_directory_defaults_to_teacher() {
        let store = Arc::new(MemoryStore::new());
        let collections = Collections::new("t1");
        let directory = OperatorDirectory::new(store, &collections);

        let operator = directory
            .resolve(&Identity {
                uid: "u1".into(),
                email: Some("new@school.test".into()),
            })
            .await;
        assert_eq!(operator.role, Role::Teacher);
        assert_eq!(operator.email, "new@school.test");
    }

    #[tokio::test]
    async fn test_directory_reads_stored_role() {
        let store = Arc::new(MemoryStore::new());
        let collections = Collections::new("t1");
        store
            .put(
                &collections.users(),
                "u1",
                wire::user_fields("head@school.test", Role::Admin),
            )
            .await
            .unwrap();

        let directory = OperatorDirectory::new(store, &collections);
        let operator = directory
            .resolve(&Identity {
                uid: "u1".into(),
                email: Some("head@school.test".into()),
            })
            .await;
        assert_eq!(operator.role, Role::Admin);
    }
}
