//! Nearest-neighbour face matcher.
//!
//! Resolves a live probe descriptor to an enrolled identity by Euclidean
//! distance over the whole roster, under a fixed acceptance threshold.

use crate::types::Descriptor;

/// Tuned operating point balancing false-accepts against false-rejects.
/// Configurable per matcher, but the default must stay at 0.6.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// One matchable roster entry: an identity with its reference descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub student_id: String,
    pub descriptor: Descriptor,
}

/// Verdict for a single probe descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchVerdict {
    Known { student_id: String, distance: f32 },
    Unknown,
}

/// Immutable matcher handle built from a roster snapshot.
///
/// Building is pure and side-effect-free; rebuilding from an identical
/// roster yields identical match behaviour for every probe.
#[derive(Debug)]
pub struct FaceMatcher {
    entries: Vec<RosterEntry>,
    threshold: f32,
}

impl FaceMatcher {
    pub fn build(entries: Vec<RosterEntry>, threshold: f32) -> Self {
        Self { entries, threshold }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the minimum-distance reference for the probe.
    ///
    /// An empty roster is always `Unknown`, as is a best distance above
    /// the threshold.
    pub fn find_best(&self, probe: &Descriptor) -> MatchVerdict {
        let mut best: Option<(&RosterEntry, f32)> = None;

        for entry in &self.entries {
            let distance = probe.euclidean_distance(&entry.descriptor);
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ => best = Some((entry, distance)),
            }
        }

        match best {
            Some((entry, distance)) if distance <= self.threshold => MatchVerdict::Known {
                student_id: entry.student_id.clone(),
                distance,
            },
            _ => MatchVerdict::Unknown,
        }
    }
}
