//! Scripted test doubles for the vision seams.
//!
//! `ScriptedEngine` replays queued per-call outcomes with an optional
//! artificial delay and records how many detection calls were ever in
//! flight at once, which is what the capture-loop overlap tests assert on.

use crate::{DetectionOpts, FaceEngine, Frame, FrameSource, VisionError};
use async_trait::async_trait;
use presence_core::{BoundingBox, Descriptor, Detection};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted detection call outcome.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Detections(Vec<Detection>),
    Failure(String),
}

impl ScriptedOutcome {
    /// A single detection carrying the given descriptor.
    pub fn face(descriptor: Descriptor) -> Self {
        ScriptedOutcome::Detections(vec![Detection {
            bounding_box: BoundingBox {
                x: 10.0,
                y: 10.0,
                width: 80.0,
                height: 80.0,
            },
            descriptor,
            confidence: 0.9,
        }])
    }

    pub fn none() -> Self {
        ScriptedOutcome::Detections(Vec::new())
    }
}

#[derive(Default)]
struct EngineCounters {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

pub struct ScriptedEngine {
    script: Mutex<VecDeque<ScriptedOutcome>>,
    delay: Option<Duration>,
    counters: EngineCounters,
}

impl ScriptedEngine {
    pub fn new(outcomes: Vec<ScriptedOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            delay: None,
            counters: EngineCounters::default(),
        }
    }

    /// Make every detection call take this long before resolving.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.counters.calls.load(Ordering::SeqCst)
    }

    /// Peak number of concurrently outstanding detection calls.
    pub fn max_in_flight(&self) -> usize {
        self.counters.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> ScriptedOutcome {
        self.script
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or_else(ScriptedOutcome::none)
    }
}

#[async_trait]
impl FaceEngine for ScriptedEngine {
    async fn ensure_ready(&self) -> Result<(), VisionError> {
        Ok(())
    }

    async fn detect_all(
        &self,
        _frame: &Frame,
        _opts: DetectionOpts,
    ) -> Result<Vec<Detection>, VisionError> {
        self.counters.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let outcome = self.next_outcome();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
        match outcome {
            ScriptedOutcome::Detections(d) => Ok(d),
            ScriptedOutcome::Failure(msg) => Err(VisionError::DetectionFailed(msg)),
        }
    }
}

/// Engine whose model load always fails; for resource-unavailable paths.
pub struct BrokenEngine;

#[async_trait]
impl FaceEngine for BrokenEngine {
    async fn ensure_ready(&self) -> Result<(), VisionError> {
        Err(VisionError::ModelLoadFailed("scripted failure".into()))
    }

    async fn detect_all(
        &self,
        _frame: &Frame,
        _opts: DetectionOpts,
    ) -> Result<Vec<Detection>, VisionError> {
        Err(VisionError::ModelLoadFailed("scripted failure".into()))
    }
}

/// Shared accounting for a [`StaticFrames`] source, readable after the
/// source itself has been moved into the loop.
#[derive(Clone, Default)]
pub struct SourceProbe {
    grabs: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
    ready: Arc<AtomicBool>,
}

impl SourceProbe {
    pub fn grabs(&self) -> usize {
        self.grabs.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

/// Frame source that hands out copies of one synthetic frame.
pub struct StaticFrames {
    probe: SourceProbe,
    sequence: u32,
}

impl StaticFrames {
    pub fn ready_source() -> (Self, SourceProbe) {
        let probe = SourceProbe::default();
        probe.set_ready(true);
        (
            Self {
                probe: probe.clone(),
                sequence: 0,
            },
            probe,
        )
    }

    pub fn not_ready_source() -> (Self, SourceProbe) {
        let probe = SourceProbe::default();
        (
            Self {
                probe: probe.clone(),
                sequence: 0,
            },
            probe,
        )
    }
}

impl FrameSource for StaticFrames {
    fn ready(&self) -> bool {
        self.probe.ready.load(Ordering::SeqCst)
    }

    fn grab(&mut self) -> Result<Frame, VisionError> {
        if !self.ready() {
            return Err(VisionError::SourceUnavailable("source not ready".into()));
        }
        self.probe.grabs.fetch_add(1, Ordering::SeqCst);
        self.sequence += 1;
        Ok(Frame {
            data: vec![0u8; 64],
            width: 8,
            height: 8,
            sequence: self.sequence,
        })
    }

    fn release(&mut self) {
        self.probe.releases.fetch_add(1, Ordering::SeqCst);
    }
}
