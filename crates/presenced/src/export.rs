//! CSV export of the incident log.
//!
//! Column set and quoting follow the report download format: the header
//! row is bare, every value cell is double-quoted with embedded quotes
//! doubled, and the record id never leaves the store.

use presence_core::Incident;

const HEADERS: [&str; 9] = [
    "studentId",
    "studentName",
    "studentClass",
    "studentGender",
    "type",
    "minutesLate",
    "reason",
    "loggedByEmail",
    "timestamp",
];

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("no incident data to export")]
    NoRows,
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Render incidents as a CSV document. An empty slice is an error so a
/// caller never writes a header-only file by accident.
pub fn incidents_to_csv(incidents: &[Incident]) -> Result<String, ExportError> {
    if incidents.is_empty() {
        return Err(ExportError::NoRows);
    }

    let mut out = String::new();
    out.push_str(&HEADERS.join(","));
    out.push('\n');

    for incident in incidents {
        let timestamp = incident
            .timestamp
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_default();
        let row = [
            quote(&incident.student_id),
            quote(&incident.student_name),
            quote(&incident.student_class),
            quote(incident.student_gender.as_code()),
            quote(incident.kind.as_str()),
            quote(&incident.minutes_late.to_string()),
            quote(&incident.reason),
            quote(&incident.logged_by_email),
            quote(&timestamp),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use presence_core::{Gender, IncidentKind};

    fn incident(reason: &str) -> Incident {
        Incident {
            id: "log-1".into(),
            student_id: "s1".into(),
            student_name: "Asha".into(),
            student_class: "7A".into(),
            student_gender: Gender::Female,
            kind: IncidentKind::Late,
            minutes_late: 12,
            reason: reason.into(),
            logged_by_email: "teacher@school".into(),
            timestamp: Some(Utc.with_ymd_and_hms(2024, 9, 2, 7, 15, 0).unwrap()),
        }
    }

    #[test]
    fn test_empty_export_is_rejected() {
        assert!(matches!(incidents_to_csv(&[]), Err(ExportError::NoRows)));
    }

    #[test]
    fn test_header_row_excludes_record_id() {
        let csv = incidents_to_csv(&[incident("Overslept")]).unwrap();
        let header = csv.lines().next().unwrap();
        assert_eq!(
            header,
            "studentId,studentName,studentClass,studentGender,type,minutesLate,reason,loggedByEmail,timestamp"
        );
        assert!(!header.contains("\"log-1\""));
        assert!(!csv.contains("log-1"));
    }

    #[test]
    fn test_values_are_quoted_and_escaped() {
        let csv = incidents_to_csv(&[incident("said \"traffic\", twice")]).unwrap();
        let row = csv.lines().nth(1).unwrap();
        assert!(row.contains("\"said \"\"traffic\"\", twice\""));
        assert!(row.starts_with("\"s1\",\"Asha\",\"7A\",\"P\",\"late\",\"12\""));
        assert!(row.ends_with("\"2024-09-02T07:15:00+00:00\""));
    }

    #[test]
    fn test_missing_timestamp_renders_empty() {
        let mut pending = incident("Overslept");
        pending.timestamp = None;
        let csv = incidents_to_csv(&[pending]).unwrap();
        assert!(csv.lines().nth(1).unwrap().ends_with(",\"\""));
    }
}
