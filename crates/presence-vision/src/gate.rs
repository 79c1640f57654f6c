//! Idempotent, memoized model loading.

use crate::VisionError;
use std::future::Future;
use tokio::sync::OnceCell;

/// Gates detection on model-asset loading.
///
/// The first caller runs the load; concurrent callers await the same
/// attempt; every later call gets the memoized outcome, including a
/// remembered failure. There is no retry path — a failed load is fatal
/// to the scanning surface.
#[derive(Default)]
pub struct ModelGate {
    loaded: OnceCell<Result<(), VisionError>>,
}

impl ModelGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn ensure_loaded<F, Fut>(&self, load: F) -> Result<(), VisionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), VisionError>>,
    {
        self.loaded
            .get_or_init(|| async {
                let outcome = load().await;
                match &outcome {
                    Ok(()) => tracing::info!("detection models loaded"),
                    Err(e) => tracing::error!(error = %e, "detection model load failed"),
                }
                outcome
            })
            .await
            .clone()
    }

    /// Whether a load attempt has completed successfully.
    pub fn is_loaded(&self) -> bool {
        matches!(self.loaded.get(), Some(Ok(())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_load_runs_once() {
        let gate = ModelGate::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            gate.ensure_loaded(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(gate.is_loaded());
    }

    #[tokio::test]
    async fn test_failure_is_memoized() {
        let gate = ModelGate::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            let result = gate
                .ensure_loaded(|| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(VisionError::ModelLoadFailed("no assets".into()))
                })
                .await;
            assert!(matches!(result, Err(VisionError::ModelLoadFailed(_))));
        }

        // The failed attempt is not retried.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!gate.is_loaded());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_load() {
        let gate = Arc::new(ModelGate::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let gate = gate.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                gate.ensure_loaded(|| async move {
                    tokio::task::yield_now().await;
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
