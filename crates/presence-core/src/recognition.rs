//! Recognition state machine.
//!
//! Tracks the currently identified subject across capture-loop ticks.
//! The transition rule is pluggable so a smoothed variant can replace the
//! instant one without touching the capture loop.

/// Screen-lifetime recognition state. `Identified` is the only phase from
/// which incident-recording actions are enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanPhase {
    /// Video source not yet producing readable frames.
    Idle,
    /// Source ready, no stable match.
    Scanning,
    /// A roster identity is currently recognized.
    Identified(String),
}

impl ScanPhase {
    pub fn identified_id(&self) -> Option<&str> {
        match self {
            ScanPhase::Identified(id) => Some(id),
            _ => None,
        }
    }
}

/// Outcome of one capture-loop tick, fed to the policy.
#[derive(Debug, Clone, PartialEq)]
pub enum TickVerdict {
    SourceNotReady,
    NoFace,
    Unknown,
    Matched(String),
}

/// Transition rule from (current phase, tick verdict) to the next phase.
pub trait RecognitionPolicy: Send {
    fn next(&mut self, current: &ScanPhase, verdict: &TickVerdict) -> ScanPhase;
}

/// The default rule: every tick's verdict immediately supersedes the
/// previous phase, with no temporal smoothing. A single transiently wrong
/// frame can flip the identified subject; that sharp edge is deliberate
/// and lives behind this trait so a majority-vote policy can replace it.
#[derive(Debug, Default)]
pub struct InstantPolicy;

impl RecognitionPolicy for InstantPolicy {
    fn next(&mut self, _current: &ScanPhase, verdict: &TickVerdict) -> ScanPhase {
        match verdict {
            TickVerdict::SourceNotReady => ScanPhase::Idle,
            TickVerdict::NoFace | TickVerdict::Unknown => ScanPhase::Scanning,
            TickVerdict::Matched(id) => ScanPhase::Identified(id.clone()),
        }
    }
}
