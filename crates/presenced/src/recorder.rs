//! Incident recording.
//!
//! Validates and persists a tardy or period-leave event for the currently
//! identified subject. Writes are single-document atomic creates with a
//! store-assigned timestamp; a failed write is surfaced to the operator
//! and never retried in the background, so operator-driven retries cannot
//! produce duplicates.

use crate::wire;
use presence_core::types::{LATE_REASON_FALLBACK, PERIOD_LEAVE_REASON};
use presence_core::{IncidentKind, Operator, Student};
use presence_store::{CollectionStore, Collections, StoreError};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("no identified student to record against")]
    NoActiveSubject,
    #[error("minutes late must be a positive whole number")]
    InvalidInput,
    #[error("failed to save attendance log: {0}")]
    WriteFailure(#[source] StoreError),
}

/// Compose-then-commit state for the tardy form. Discarded on every
/// successful or abandoned action so a stale subject can never receive a
/// second accidental submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncidentDraft {
    pub minutes_late: String,
    pub reason: String,
}

impl IncidentDraft {
    /// Minutes late as a positive integer, or `InvalidInput`.
    pub fn parse_minutes(&self) -> Result<u32, RecorderError> {
        let minutes: i64 = self
            .minutes_late
            .trim()
            .parse()
            .map_err(|_| RecorderError::InvalidInput)?;
        if minutes <= 0 {
            return Err(RecorderError::InvalidInput);
        }
        u32::try_from(minutes).map_err(|_| RecorderError::InvalidInput)
    }
}

pub struct IncidentRecorder {
    store: Arc<dyn CollectionStore>,
    logs_path: String,
    draft: Mutex<IncidentDraft>,
}

impl IncidentRecorder {
    pub fn new(store: Arc<dyn CollectionStore>, collections: &Collections) -> Self {
        Self {
            store,
            logs_path: collections.logs(),
            draft: Mutex::new(IncidentDraft::default()),
        }
    }

    pub fn set_draft(&self, minutes_late: &str, reason: &str) {
        *self.draft.lock().expect("draft lock poisoned") = IncidentDraft {
            minutes_late: minutes_late.to_string(),
            reason: reason.to_string(),
        };
    }

    pub fn draft(&self) -> IncidentDraft {
        self.draft.lock().expect("draft lock poisoned").clone()
    }

    /// Discard the compose state without writing.
    pub fn abandon(&self) {
        *self.draft.lock().expect("draft lock poisoned") = IncidentDraft::default();
    }

    /// Validate the current draft and record a tardy for the subject.
    /// The draft survives a write failure so the operator can retry.
    pub async fn submit_late(
        &self,
        subject: Option<&Student>,
        operator: &Operator,
    ) -> Result<String, RecorderError> {
        let draft = self.draft();
        let minutes = draft.parse_minutes()?;
        self.record_late(subject, minutes, &draft.reason, operator)
            .await
    }

    pub async fn record_late(
        &self,
        subject: Option<&Student>,
        minutes_late: u32,
        reason: &str,
        operator: &Operator,
    ) -> Result<String, RecorderError> {
        if minutes_late == 0 {
            return Err(RecorderError::InvalidInput);
        }
        let subject = subject.ok_or(RecorderError::NoActiveSubject)?;
        let reason = if reason.trim().is_empty() {
            LATE_REASON_FALLBACK
        } else {
            reason
        };
        self.write(subject, IncidentKind::Late, minutes_late, reason, operator)
            .await
    }

    pub async fn record_leave(
        &self,
        subject: Option<&Student>,
        operator: &Operator,
    ) -> Result<String, RecorderError> {
        let subject = subject.ok_or(RecorderError::NoActiveSubject)?;
        self.write(subject, IncidentKind::PeriodLeave, 0, PERIOD_LEAVE_REASON, operator)
            .await
    }

    async fn write(
        &self,
        subject: &Student,
        kind: IncidentKind,
        minutes_late: u32,
        reason: &str,
        operator: &Operator,
    ) -> Result<String, RecorderError> {
        let fields = wire::incident_fields(subject, kind, minutes_late, reason, &operator.email);
        let id = self
            .store
            .create(&self.logs_path, fields)
            .await
            .map_err(RecorderError::WriteFailure)?;

        self.abandon();
        tracing::info!(
            incident = %id,
            student = %subject.id,
            kind = kind.as_str(),
            logged_by = %operator.email,
            "incident recorded"
        );
        Ok(id)
    }
}
