use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reference and probe face embeddings are always this long.
pub const DESCRIPTOR_LEN: usize = 128;

/// Default reason stored for a tardy record submitted without one.
pub const LATE_REASON_FALLBACK: &str = "No reason provided";

/// Reason stored for every period-leave record.
pub const PERIOD_LEAVE_REASON: &str = "Period leave approved";

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("descriptor must have {DESCRIPTOR_LEN} dimensions, got {0}")]
    WrongLength(usize),
}

/// Fixed-length face embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Descriptor(Vec<f32>);

impl Descriptor {
    pub fn from_vec(values: Vec<f32>) -> Result<Self, DescriptorError> {
        if values.len() != DESCRIPTOR_LEN {
            return Err(DescriptorError::WrongLength(values.len()));
        }
        Ok(Self(values))
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }

    /// Euclidean distance to another descriptor.
    pub fn euclidean_distance(&self, other: &Descriptor) -> f32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Axis-aligned face bounding box in frame coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One detected face in a frame. Ephemeral, never persisted.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bounding_box: BoundingBox,
    pub descriptor: Descriptor,
    pub confidence: f32,
}

/// Student gender, carried with the roster's original wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    /// Wire code "L".
    Male,
    /// Wire code "P".
    Female,
}

impl Gender {
    pub fn as_code(&self) -> &'static str {
        match self {
            Gender::Male => "L",
            Gender::Female => "P",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "L" => Some(Gender::Male),
            "P" => Some(Gender::Female),
            _ => None,
        }
    }
}

/// An enrolled identity. The descriptor is present only after a
/// successful enrollment scan; students without one are kept for
/// display but excluded from matching.
#[derive(Debug, Clone, PartialEq)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub class: String,
    pub gender: Gender,
    pub descriptor: Option<Descriptor>,
}

/// Kind of a persisted disciplinary record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncidentKind {
    Late,
    PeriodLeave,
}

impl IncidentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentKind::Late => "late",
            IncidentKind::PeriodLeave => "period-leave",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "late" => Some(IncidentKind::Late),
            "period-leave" => Some(IncidentKind::PeriodLeave),
            _ => None,
        }
    }
}

/// A persisted tardy or period-leave record.
///
/// Carries a denormalized snapshot of the student as they were at
/// logging time; later roster edits never alter past incidents.
/// Immutable once written — there is no update path.
#[derive(Debug, Clone)]
pub struct Incident {
    pub id: String,
    pub student_id: String,
    pub student_name: String,
    pub student_class: String,
    pub student_gender: Gender,
    pub kind: IncidentKind,
    pub minutes_late: u32,
    pub reason: String,
    pub logged_by_email: String,
    /// Assigned by the store at write time, never the client clock.
    pub timestamp: Option<DateTime<Utc>>,
}

/// Operator role. Gates student and user management.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "teacher" => Some(Role::Teacher),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// The authenticated user performing recognition and logging actions.
#[derive(Debug, Clone, PartialEq)]
pub struct Operator {
    pub email: String,
    pub role: Role,
}
