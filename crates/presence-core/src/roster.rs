//! In-memory roster projection and memoized matcher cache.
//!
//! The [`DescriptorStore`] exclusively owns the projection of the students
//! collection: a read-through cache replaced wholesale on every upstream
//! change notification, never independently mutated. Readers always see a
//! fully-formed snapshot.

use crate::matcher::{FaceMatcher, RosterEntry};
use crate::types::Student;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// One immutable generation of the roster.
///
/// The version stamp increases on every rebuild and keys the matcher cache.
#[derive(Debug)]
pub struct RosterSnapshot {
    version: u64,
    students: Vec<Student>,
}

impl RosterSnapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    /// All enrolled students, ordered by id, descriptor or not.
    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn get(&self, id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == id)
    }

    /// Entries eligible for matching: only students with a descriptor.
    pub fn matchable(&self) -> Vec<RosterEntry> {
        self.students
            .iter()
            .filter_map(|s| {
                s.descriptor.as_ref().map(|d| RosterEntry {
                    student_id: s.id.clone(),
                    descriptor: d.clone(),
                })
            })
            .collect()
    }
}

/// Owner of the live roster projection.
pub struct DescriptorStore {
    snapshot: RwLock<Arc<RosterSnapshot>>,
    next_version: AtomicU64,
}

impl Default for DescriptorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorStore {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(RosterSnapshot {
                version: 0,
                students: Vec::new(),
            })),
            next_version: AtomicU64::new(1),
        }
    }

    /// Replace the snapshot atomically with the full current student set.
    ///
    /// Called from the collection subscription on every change; additions,
    /// edits and deletions all land here without a restart.
    pub fn apply(&self, mut students: Vec<Student>) {
        students.sort_by(|a, b| a.id.cmp(&b.id));
        let version = self.next_version.fetch_add(1, Ordering::Relaxed);
        let matchable = students.iter().filter(|s| s.descriptor.is_some()).count();
        tracing::debug!(version, total = students.len(), matchable, "roster rebuilt");

        let snapshot = Arc::new(RosterSnapshot { version, students });
        *self.snapshot.write().expect("roster lock poisoned") = snapshot;
    }

    pub fn snapshot(&self) -> Arc<RosterSnapshot> {
        self.snapshot.read().expect("roster lock poisoned").clone()
    }
}

/// Memoized matcher, keyed on the roster snapshot version stamp.
///
/// The matcher is rebuilt only when the stamp changes, not on every tick.
pub struct MatcherCache {
    threshold: f32,
    cached: Mutex<Option<(u64, Arc<FaceMatcher>)>>,
}

impl MatcherCache {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            cached: Mutex::new(None),
        }
    }

    pub fn matcher_for(&self, snapshot: &RosterSnapshot) -> Arc<FaceMatcher> {
        let mut cached = self.cached.lock().expect("matcher cache lock poisoned");
        if let Some((version, matcher)) = cached.as_ref() {
            if *version == snapshot.version() {
                return matcher.clone();
            }
        }

        tracing::debug!(version = snapshot.version(), "rebuilding matcher");
        let matcher = Arc::new(FaceMatcher::build(snapshot.matchable(), self.threshold));
        *cached = Some((snapshot.version(), matcher.clone()));
        matcher
    }
}
