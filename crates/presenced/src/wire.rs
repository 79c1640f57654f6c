//! Document encoding for the students, logs and users collections.
//!
//! Field names and value codes match the data already in the store:
//! descriptors travel as a JSON array string under `faceDescriptor`,
//! genders as "L"/"P", incident kinds as "late"/"period-leave".

use chrono::{DateTime, Utc};
use presence_core::{Descriptor, Gender, Incident, IncidentKind, Role, Student};
use presence_store::{Document, Fields, SERVER_TIMESTAMP};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WireError {
    #[error("document {doc}: missing field {field}")]
    MissingField { doc: String, field: &'static str },
    #[error("document {doc}: bad value in field {field}")]
    BadValue { doc: String, field: &'static str },
}

fn require_str<'a>(doc: &'a Document, field: &'static str) -> Result<&'a str, WireError> {
    doc.get_str(field).ok_or_else(|| WireError::MissingField {
        doc: doc.id.clone(),
        field,
    })
}

pub fn encode_descriptor(descriptor: &Descriptor) -> String {
    serde_json::to_string(descriptor.values()).unwrap_or_default()
}

pub fn decode_descriptor(raw: &str) -> Option<Descriptor> {
    let values: Vec<f32> = serde_json::from_str(raw).ok()?;
    Descriptor::from_vec(values).ok()
}

pub fn student_from_doc(doc: &Document) -> Result<Student, WireError> {
    let name = require_str(doc, "name")?.to_string();
    let class = require_str(doc, "class")?.to_string();
    let gender =
        Gender::from_code(require_str(doc, "gender")?).ok_or_else(|| WireError::BadValue {
            doc: doc.id.clone(),
            field: "gender",
        })?;

    // A corrupt descriptor leaves the student visible but unmatchable.
    let descriptor = doc.get_str("faceDescriptor").and_then(|raw| {
        let decoded = decode_descriptor(raw);
        if decoded.is_none() {
            tracing::warn!(student = %doc.id, "unreadable face descriptor; excluded from matching");
        }
        decoded
    });

    Ok(Student {
        id: doc.id.clone(),
        name,
        class,
        gender,
        descriptor,
    })
}

pub fn student_fields(
    name: &str,
    class: &str,
    gender: Gender,
    descriptor: &Descriptor,
) -> Fields {
    let mut fields = Fields::new();
    fields.insert("name".into(), name.into());
    fields.insert("class".into(), class.into());
    fields.insert("gender".into(), gender.as_code().into());
    fields.insert("faceDescriptor".into(), encode_descriptor(descriptor).into());
    fields
}

pub fn incident_fields(
    subject: &Student,
    kind: IncidentKind,
    minutes_late: u32,
    reason: &str,
    logged_by_email: &str,
) -> Fields {
    let mut fields = Fields::new();
    fields.insert("studentId".into(), subject.id.as_str().into());
    fields.insert("studentName".into(), subject.name.as_str().into());
    fields.insert("studentClass".into(), subject.class.as_str().into());
    fields.insert("studentGender".into(), subject.gender.as_code().into());
    fields.insert("type".into(), kind.as_str().into());
    fields.insert("minutesLate".into(), minutes_late.into());
    fields.insert("reason".into(), reason.into());
    fields.insert("loggedByEmail".into(), logged_by_email.into());
    fields.insert("timestamp".into(), SERVER_TIMESTAMP.into());
    fields
}

pub fn incident_from_doc(doc: &Document) -> Result<Incident, WireError> {
    let kind =
        IncidentKind::from_str(require_str(doc, "type")?).ok_or_else(|| WireError::BadValue {
            doc: doc.id.clone(),
            field: "type",
        })?;
    let gender =
        Gender::from_code(require_str(doc, "studentGender")?).ok_or_else(|| WireError::BadValue {
            doc: doc.id.clone(),
            field: "studentGender",
        })?;
    let minutes_late = doc
        .get_i64("minutesLate")
        .and_then(|m| u32::try_from(m).ok())
        .ok_or_else(|| WireError::BadValue {
            doc: doc.id.clone(),
            field: "minutesLate",
        })?;

    // The timestamp may be unresolved on a freshly observed local write.
    let timestamp = doc
        .get_str("timestamp")
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Ok(Incident {
        id: doc.id.clone(),
        student_id: require_str(doc, "studentId")?.to_string(),
        student_name: require_str(doc, "studentName")?.to_string(),
        student_class: require_str(doc, "studentClass")?.to_string(),
        student_gender: gender,
        kind,
        minutes_late,
        reason: doc.get_str("reason").unwrap_or_default().to_string(),
        logged_by_email: require_str(doc, "loggedByEmail")?.to_string(),
        timestamp,
    })
}

/// One row of the users collection.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub role: Role,
}

pub fn user_from_doc(doc: &Document) -> Result<UserRecord, WireError> {
    Ok(UserRecord {
        id: doc.id.clone(),
        email: require_str(doc, "email")?.to_string(),
        // Absent or unknown role falls back to teacher.
        role: doc
            .get_str("role")
            .and_then(Role::from_str)
            .unwrap_or_default(),
    })
}

pub fn user_fields(email: &str, role: Role) -> Fields {
    let mut fields = Fields::new();
    fields.insert("email".into(), email.into());
    fields.insert("role".into(), role.as_str().into());
    fields
}
