//! Dashboard aggregations over recorded incidents.
//!
//! Pure functions; the caller supplies the incident list and, for the
//! time-bucketed series, the reference date.

use crate::types::{Incident, IncidentKind};
use chrono::NaiveDate;
use std::collections::HashMap;

/// Tardy total for one student, carried with the denormalized snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct TardyCount {
    pub student_id: String,
    pub name: String,
    pub class: String,
    pub tardies: usize,
}

/// One day of the trailing tardy series.
#[derive(Debug, Clone, PartialEq)]
pub struct DayBucket {
    pub date: NaiveDate,
    pub tardies: usize,
}

/// Late vs period-leave totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KindShare {
    pub late: usize,
    pub period_leave: usize,
}

/// Students with the most tardy records, descending. Ties break by name
/// so the order is stable.
pub fn top_tardy_students(incidents: &[Incident], limit: usize) -> Vec<TardyCount> {
    let mut counts: HashMap<&str, TardyCount> = HashMap::new();
    for incident in incidents.iter().filter(|i| i.kind == IncidentKind::Late) {
        counts
            .entry(&incident.student_id)
            .or_insert_with(|| TardyCount {
                student_id: incident.student_id.clone(),
                name: incident.student_name.clone(),
                class: incident.student_class.clone(),
                tardies: 0,
            })
            .tardies += 1;
    }

    let mut ranked: Vec<TardyCount> = counts.into_values().collect();
    ranked.sort_by(|a, b| b.tardies.cmp(&a.tardies).then_with(|| a.name.cmp(&b.name)));
    ranked.truncate(limit);
    ranked
}

/// Tardies per day over the trailing `days` window ending at `today`,
/// zero-filled so every day appears. Incidents without a store-assigned
/// timestamp are skipped.
pub fn tardies_by_day(incidents: &[Incident], days: usize, today: NaiveDate) -> Vec<DayBucket> {
    let mut buckets: Vec<DayBucket> = (0..days)
        .map(|offset| DayBucket {
            date: today - chrono::Days::new((days - 1 - offset) as u64),
            tardies: 0,
        })
        .collect();

    for incident in incidents.iter().filter(|i| i.kind == IncidentKind::Late) {
        let Some(ts) = incident.timestamp else {
            continue;
        };
        let date = ts.date_naive();
        if let Some(bucket) = buckets.iter_mut().find(|b| b.date == date) {
            bucket.tardies += 1;
        }
    }

    buckets
}

/// Count of tardy records per reason, descending. Empty or whitespace
/// reasons fall under "Unspecified".
pub fn reason_distribution(incidents: &[Incident]) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for incident in incidents.iter().filter(|i| i.kind == IncidentKind::Late) {
        let reason = incident.reason.trim();
        let key = if reason.is_empty() {
            "Unspecified".to_string()
        } else {
            reason.to_string()
        };
        *counts.entry(key).or_default() += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

pub fn kind_share(incidents: &[Incident]) -> KindShare {
    let mut share = KindShare::default();
    for incident in incidents {
        match incident.kind {
            IncidentKind::Late => share.late += 1,
            IncidentKind::PeriodLeave => share.period_leave += 1,
        }
    }
    share
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Gender;
    use chrono::{Datelike, TimeZone, Utc};

    fn incident(student_id: &str, name: &str, kind: IncidentKind, reason: &str) -> Incident {
        Incident {
            id: format!("log-{student_id}-{reason}"),
            student_id: student_id.to_string(),
            student_name: name.to_string(),
            student_class: "7A".to_string(),
            student_gender: Gender::Male,
            kind,
            minutes_late: if kind == IncidentKind::Late { 5 } else { 0 },
            reason: reason.to_string(),
            logged_by_email: "teacher@school.test".to_string(),
            timestamp: None,
        }
    }

    #[test]
    fn test_top_tardy_students_ranks_and_truncates() {
        let mut incidents = vec![
            incident("s1", "Ana", IncidentKind::Late, "traffic"),
            incident("s1", "Ana", IncidentKind::Late, "overslept"),
            incident("s2", "Budi", IncidentKind::Late, "traffic"),
            incident("s3", "Citra", IncidentKind::PeriodLeave, ""),
        ];
        incidents.push(incident("s1", "Ana", IncidentKind::Late, "rain"));

        let top = top_tardy_students(&incidents, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].student_id, "s1");
        assert_eq!(top[0].tardies, 3);
        assert_eq!(top[1].student_id, "s2");
    }

    #[test]
    fn test_top_tardy_ignores_period_leave() {
        let incidents = vec![incident("s1", "Ana", IncidentKind::PeriodLeave, "")];
        assert!(top_tardy_students(&incidents, 5).is_empty());
    }

    #[test]
    fn test_tardies_by_day_zero_fills_window() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let mut a = incident("s1", "Ana", IncidentKind::Late, "");
        a.timestamp = Some(Utc.with_ymd_and_hms(2026, 3, 9, 7, 30, 0).unwrap());
        let mut b = incident("s2", "Budi", IncidentKind::Late, "");
        b.timestamp = Some(Utc.with_ymd_and_hms(2026, 3, 9, 8, 0, 0).unwrap());
        // Outside the window.
        let mut old = incident("s3", "Citra", IncidentKind::Late, "");
        old.timestamp = Some(Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap());

        let series = tardies_by_day(&[a, b, old], 30, today);
        assert_eq!(series.len(), 30);
        assert_eq!(series[0].date, today - chrono::Days::new(29));
        assert_eq!(series[29].date, today);
        let day = series.iter().find(|d| d.date.day() == 9).unwrap();
        assert_eq!(day.tardies, 2);
        assert_eq!(series.iter().map(|d| d.tardies).sum::<usize>(), 2);
    }

    #[test]
    fn test_tardies_by_day_skips_unresolved_timestamps() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let pending = incident("s1", "Ana", IncidentKind::Late, "");
        let series = tardies_by_day(&[pending], 7, today);
        assert_eq!(series.iter().map(|d| d.tardies).sum::<usize>(), 0);
    }

    #[test]
    fn test_reason_distribution_fallback() {
        let incidents = vec![
            incident("s1", "Ana", IncidentKind::Late, "traffic"),
            incident("s2", "Budi", IncidentKind::Late, "traffic"),
            incident("s3", "Citra", IncidentKind::Late, "  "),
        ];
        let dist = reason_distribution(&incidents);
        assert_eq!(dist[0], ("traffic".to_string(), 2));
        assert_eq!(dist[1], ("Unspecified".to_string(), 1));
    }

    #[test]
    fn test_kind_share_totals() {
        let incidents = vec![
            incident("s1", "Ana", IncidentKind::Late, ""),
            incident("s2", "Budi", IncidentKind::PeriodLeave, ""),
            incident("s3", "Citra", IncidentKind::Late, ""),
        ];
        let share = kind_share(&incidents);
        assert_eq!(share.late, 2);
        assert_eq!(share.period_leave, 1);
    }
}
