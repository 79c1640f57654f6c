//! presence-vision — Seams to the external face detection service and the
//! camera/video source.
//!
//! The detection model is a black box behind [`FaceEngine`]: one call per
//! frame returns bounding box, confidence and descriptor together, so
//! frame-to-result latency stays bounded. [`FrameSource`] owns the camera
//! handle; acquisition and release are strictly paired.

pub mod fake;
pub mod gate;
pub mod null;

pub use gate::ModelGate;

use async_trait::async_trait;
use presence_core::Detection;
use thiserror::Error;

/// Cloneable so a memoized model-load failure can be handed to every caller.
#[derive(Error, Debug, Clone)]
pub enum VisionError {
    #[error("video source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("model load failed: {0}")]
    ModelLoadFailed(String),
    #[error("detection failed: {0}")]
    DetectionFailed(String),
}

/// One sampled video frame. Pixel layout is engine-defined.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct DetectionOpts {
    pub min_confidence: f32,
}

impl Default for DetectionOpts {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
        }
    }
}

/// Black-box face detection and embedding service.
#[async_trait]
pub trait FaceEngine: Send + Sync {
    /// Complete model loading. Idempotent; gates both the capture loop and
    /// enrollment capture. A remembered failure is returned to every caller.
    async fn ensure_ready(&self) -> Result<(), VisionError>;

    /// Detect every face in the frame above the confidence floor.
    async fn detect_all(
        &self,
        frame: &Frame,
        opts: DetectionOpts,
    ) -> Result<Vec<Detection>, VisionError>;

    /// Detect the single most prominent face; used by enrollment capture.
    async fn detect_single(
        &self,
        frame: &Frame,
        opts: DetectionOpts,
    ) -> Result<Option<Detection>, VisionError> {
        Ok(self.detect_all(frame, opts).await?.into_iter().next())
    }
}

/// Exclusive handle on the camera/video stream.
///
/// `release` must run on every exit path — explicit stop, error, or
/// navigation away — so the device lock is never leaked.
pub trait FrameSource: Send {
    /// Whether the source is producing readable frames yet.
    fn ready(&self) -> bool;

    fn grab(&mut self) -> Result<Frame, VisionError>;

    fn release(&mut self);
}
