//! Offline stand-ins used when no detection backend is deployed.
//!
//! The daemon wires these by default so the whole pipeline runs (and
//! shuts down) correctly on hosts without a camera or model assets; the
//! capture loop simply stays idle.

use crate::{DetectionOpts, FaceEngine, Frame, FrameSource, ModelGate, VisionError};
use async_trait::async_trait;
use presence_core::Detection;

/// Engine whose models always load and which never sees a face.
#[derive(Default)]
pub struct NullEngine {
    gate: ModelGate,
}

#[async_trait]
impl FaceEngine for NullEngine {
    async fn ensure_ready(&self) -> Result<(), VisionError> {
        self.gate.ensure_loaded(|| async { Ok(()) }).await
    }

    async fn detect_all(
        &self,
        _frame: &Frame,
        _opts: DetectionOpts,
    ) -> Result<Vec<Detection>, VisionError> {
        Ok(Vec::new())
    }
}

/// Source that never becomes ready.
#[derive(Debug, Default)]
pub struct OfflineSource;

impl FrameSource for OfflineSource {
    fn ready(&self) -> bool {
        false
    }

    fn grab(&mut self) -> Result<Frame, VisionError> {
        Err(VisionError::SourceUnavailable("no video device".into()))
    }

    fn release(&mut self) {}
}
