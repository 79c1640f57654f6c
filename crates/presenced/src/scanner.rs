//! The capture loop.
//!
//! A fixed-interval sampler that grabs one frame per tick, runs a single
//! combined detection call, resolves the first face against the roster
//! matcher and feeds the verdict into the recognition policy. Exactly one
//! tick is ever in flight: the loop awaits each detection before the next
//! tick is scheduled, and a slow tick skips missed intervals instead of
//! overlapping them.
//!
//! Stopping cancels the pending timer, discards any in-flight detection
//! result, and releases the frame source exactly once on every exit path.

use crate::config::Config;
use presence_core::{
    DescriptorStore, Detection, MatchVerdict, MatcherCache, RecognitionPolicy, ScanPhase, Student,
    TickVerdict,
};
use presence_store::{CollectionStore, Collections};
use presence_vision::{DetectionOpts, FaceEngine, FrameSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Operator-visible scanning state.
#[derive(Debug, Clone)]
pub struct ScanStatus {
    pub phase: ScanPhase,
    pub message: String,
    /// Snapshot of the identified student, for the action panel and the
    /// incident recorder.
    pub subject: Option<Student>,
}

impl ScanStatus {
    fn initializing() -> Self {
        Self {
            phase: ScanPhase::Idle,
            message: "Initializing camera...".to_string(),
            subject: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub tick_interval: Duration,
    pub match_threshold: f32,
    pub min_confidence: f32,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(1500),
            match_threshold: presence_core::DEFAULT_MATCH_THRESHOLD,
            min_confidence: 0.6,
        }
    }
}

impl From<&Config> for ScannerConfig {
    fn from(config: &Config) -> Self {
        Self {
            tick_interval: config.tick_interval(),
            match_threshold: config.match_threshold,
            min_confidence: config.min_confidence,
        }
    }
}

/// Detection overlay hook for operator feedback. Invoked on its own task
/// each tick, fire-and-forget, so a slow sink cannot stall the loop.
pub type DetectionSink = Arc<dyn Fn(Vec<Detection>) + Send + Sync>;

/// Running scanner. Dropping the handle does not stop the loop; call
/// [`ScannerHandle::stop`].
pub struct ScannerHandle {
    status_rx: watch::Receiver<ScanStatus>,
    cancel: CancellationToken,
    tick_task: JoinHandle<()>,
    roster_task: JoinHandle<()>,
}

impl ScannerHandle {
    pub fn status(&self) -> watch::Receiver<ScanStatus> {
        self.status_rx.clone()
    }

    pub fn current(&self) -> ScanStatus {
        self.status_rx.borrow().clone()
    }

    /// The identified subject, if the machine is in `Identified`.
    pub fn subject(&self) -> Option<Student> {
        self.status_rx.borrow().subject.clone()
    }

    /// Stop the loop: cancel the pending tick, drop any in-flight
    /// detection, release the frame source, end the roster feed.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.tick_task.await;
        let _ = self.roster_task.await;
    }
}

/// Spawn the capture loop and its roster subscription.
pub fn spawn_scanner(
    store: Arc<dyn CollectionStore>,
    collections: Collections,
    engine: Arc<dyn FaceEngine>,
    source: Box<dyn FrameSource>,
    policy: Box<dyn RecognitionPolicy>,
    config: ScannerConfig,
    overlay: Option<DetectionSink>,
) -> ScannerHandle {
    let roster = Arc::new(DescriptorStore::new());
    let cancel = CancellationToken::new();
    let (status_tx, status_rx) = watch::channel(ScanStatus::initializing());

    let roster_task = tokio::spawn(feed_roster(
        store,
        collections.students(),
        roster.clone(),
        cancel.clone(),
    ));

    let tick_task = tokio::spawn(run_loop(
        source,
        engine,
        roster,
        policy,
        config,
        cancel.clone(),
        status_tx,
        overlay,
    ));

    ScannerHandle {
        status_rx,
        cancel,
        tick_task,
        roster_task,
    }
}

/// Keep the descriptor store current from the students collection.
/// Ends on cancellation; a dead feed freezes the roster at its last
/// snapshot instead of crashing the screen.
async fn feed_roster(
    store: Arc<dyn CollectionStore>,
    students_path: String,
    roster: Arc<DescriptorStore>,
    cancel: CancellationToken,
) {
    let mut sub = match store.subscribe(&students_path).await {
        Ok(sub) => sub,
        Err(e) => {
            tracing::warn!(error = %e, "roster subscription failed; matching disabled");
            return;
        }
    };

    loop {
        let items = tokio::select! {
            _ = cancel.cancelled() => return,
            items = sub.recv() => items,
        };
        match items {
            Some(docs) => {
                let students: Vec<Student> = docs
                    .iter()
                    .filter_map(|doc| match crate::wire::student_from_doc(doc) {
                        Ok(student) => Some(student),
                        Err(e) => {
                            tracing::warn!(error = %e, "skipping malformed student record");
                            None
                        }
                    })
                    .collect();
                roster.apply(students);
            }
            None => {
                tracing::warn!("roster feed ended; roster frozen at last snapshot");
                return;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_loop(
    mut source: Box<dyn FrameSource>,
    engine: Arc<dyn FaceEngine>,
    roster: Arc<DescriptorStore>,
    mut policy: Box<dyn RecognitionPolicy>,
    config: ScannerConfig,
    cancel: CancellationToken,
    status_tx: watch::Sender<ScanStatus>,
    overlay: Option<DetectionSink>,
) {
    // Model loading gates the loop. A load failure is fatal to this
    // screen: persistent status, no auto-recovery.
    if let Err(e) = engine.ensure_ready().await {
        tracing::error!(error = %e, "model load failed; scanner idle");
        status_tx.send_replace(ScanStatus {
            phase: ScanPhase::Idle,
            message: "Failed to load face recognition models.".to_string(),
            subject: None,
        });
        cancel.cancelled().await;
        source.release();
        return;
    }

    let cache = MatcherCache::new(config.match_threshold);
    let opts = DetectionOpts {
        min_confidence: config.min_confidence,
    };
    let mut interval = tokio::time::interval(config.tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut phase = ScanPhase::Idle;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        // A cancellation during the detection await discards the
        // in-flight result; it must never reach the state machine.
        let Some(outcome) = tick(&mut source, &engine, &roster, &cache, opts, &cancel, &overlay).await
        else {
            break;
        };

        let previous = phase.clone();
        phase = policy.next(&phase, &outcome.verdict);
        status_tx.send_replace(status_for(&previous, &phase, &outcome));
    }

    source.release();
    tracing::debug!("capture loop stopped; source released");
}

struct TickOutcome {
    verdict: TickVerdict,
    subject: Option<Student>,
}

/// One tick. Returns `None` only when cancelled mid-detection.
async fn tick(
    source: &mut Box<dyn FrameSource>,
    engine: &Arc<dyn FaceEngine>,
    roster: &DescriptorStore,
    cache: &MatcherCache,
    opts: DetectionOpts,
    cancel: &CancellationToken,
    overlay: &Option<DetectionSink>,
) -> Option<TickOutcome> {
    if !source.ready() {
        return Some(TickOutcome {
            verdict: TickVerdict::SourceNotReady,
            subject: None,
        });
    }

    let frame = match source.grab() {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(error = %e, "frame grab failed; treating tick as no face");
            return Some(TickOutcome {
                verdict: TickVerdict::NoFace,
                subject: None,
            });
        }
    };

    let detections = tokio::select! {
        _ = cancel.cancelled() => return None,
        result = engine.detect_all(&frame, opts) => match result {
            Ok(detections) => detections,
            Err(e) => {
                // Transient failure: absorbed here, loop stays alive.
                tracing::warn!(error = %e, "detection failed; treating tick as no face");
                return Some(TickOutcome {
                    verdict: TickVerdict::NoFace,
                    subject: None,
                });
            }
        },
    };

    if let Some(overlay) = overlay {
        let sink = overlay.clone();
        let observed = detections.clone();
        tokio::spawn(async move { sink(observed) });
    }

    // Only the first detection counts; multi-face frames are out of scope.
    let Some(first) = detections.first() else {
        return Some(TickOutcome {
            verdict: TickVerdict::NoFace,
            subject: None,
        });
    };

    let snapshot = roster.snapshot();
    let matcher = cache.matcher_for(&snapshot);
    match matcher.find_best(&first.descriptor) {
        MatchVerdict::Known {
            student_id,
            distance,
        } => {
            tracing::debug!(student = %student_id, distance, "face matched");
            let subject = snapshot.get(&student_id).cloned();
            Some(TickOutcome {
                verdict: TickVerdict::Matched(student_id),
                subject,
            })
        }
        MatchVerdict::Unknown => Some(TickOutcome {
            verdict: TickVerdict::Unknown,
            subject: None,
        }),
    }
}

fn status_for(previous: &ScanPhase, phase: &ScanPhase, outcome: &TickOutcome) -> ScanStatus {
    let message = match (&outcome.verdict, &outcome.subject) {
        (TickVerdict::SourceNotReady, _) => "Initializing camera...".to_string(),
        (TickVerdict::Matched(_), Some(subject)) => format!("Hello {}.", subject.name),
        (TickVerdict::Matched(_), None) | (TickVerdict::Unknown, _) => {
            "Face not recognized.".to_string()
        }
        (TickVerdict::NoFace, _) if *previous == ScanPhase::Idle => {
            "Camera ready. Looking for faces...".to_string()
        }
        (TickVerdict::NoFace, _) => "No face detected.".to_string(),
    };

    ScanStatus {
        phase: phase.clone(),
        message,
        subject: outcome.subject.clone(),
    }
}
