//! presence-core — Face matching and recognition state engine.
//!
//! Holds the enrolled roster projection, resolves live face descriptors
//! against it under a distance threshold, and drives the per-tick
//! recognition state machine. Pure logic, no I/O.

pub mod matcher;
pub mod recognition;
pub mod report;
pub mod roster;
pub mod types;

pub use matcher::{FaceMatcher, MatchVerdict, RosterEntry, DEFAULT_MATCH_THRESHOLD};
pub use recognition::{InstantPolicy, RecognitionPolicy, ScanPhase, TickVerdict};
pub use roster::{DescriptorStore, MatcherCache, RosterSnapshot};
pub use types::{
    BoundingBox, Descriptor, Detection, Gender, Incident, IncidentKind, Operator, Role, Student,
    DESCRIPTOR_LEN,
};
