//! Roster and user administration.
//!
//! All mutating operations require an admin operator; readers are open to
//! any signed-in operator. Enrollment runs a one-shot capture against the
//! vision engine so a student record never lands without a usable
//! descriptor.

use crate::wire;
use presence_core::{Descriptor, Gender, Operator, Role, Student};
use presence_store::{CollectionStore, Collections, StoreError};
use presence_vision::{DetectionOpts, FaceEngine, FrameSource, VisionError};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("operation requires the admin role")]
    Forbidden,
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("student has no enrolled face descriptor")]
    DescriptorRequired,
    #[error("no face detected in the enrollment frame")]
    FaceNotDetected,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Vision(#[from] VisionError),
}

/// Unsaved student form state. `id` is empty for a new enrollment.
#[derive(Debug, Clone)]
pub struct StudentDraft {
    pub id: String,
    pub name: String,
    pub class: String,
    pub gender: Gender,
    pub descriptor: Option<Descriptor>,
}

impl StudentDraft {
    fn validate(&self) -> Result<(), AdminError> {
        if self.name.trim().is_empty() {
            return Err(AdminError::MissingField("name"));
        }
        if self.class.trim().is_empty() {
            return Err(AdminError::MissingField("class"));
        }
        if self.descriptor.is_none() {
            return Err(AdminError::DescriptorRequired);
        }
        Ok(())
    }
}

pub struct AdminSurface {
    store: Arc<dyn CollectionStore>,
    students_path: String,
    users_path: String,
}

impl AdminSurface {
    pub fn new(store: Arc<dyn CollectionStore>, collections: &Collections) -> Self {
        Self {
            store,
            students_path: collections.students(),
            users_path: collections.users(),
        }
    }

    fn require_admin(operator: &Operator) -> Result<(), AdminError> {
        if operator.role == Role::Admin {
            Ok(())
        } else {
            Err(AdminError::Forbidden)
        }
    }

    /// Create or overwrite a student record. A descriptor is mandatory on
    /// every save; an edit that drops it is rejected rather than silently
    /// making the student unmatchable.
    pub async fn save_student(
        &self,
        operator: &Operator,
        draft: &StudentDraft,
    ) -> Result<String, AdminError> {
        Self::require_admin(operator)?;
        draft.validate()?;
        // validate() guarantees the descriptor is present.
        let descriptor = draft.descriptor.as_ref().ok_or(AdminError::DescriptorRequired)?;
        let fields = wire::student_fields(
            draft.name.trim(),
            draft.class.trim(),
            draft.gender,
            descriptor,
        );

        let id = if draft.id.is_empty() {
            self.store.create(&self.students_path, fields).await?
        } else {
            self.store.put(&self.students_path, &draft.id, fields).await?;
            draft.id.clone()
        };
        tracing::info!(student = %id, operator = %operator.email, "student record saved");
        Ok(id)
    }

    pub async fn delete_student(&self, operator: &Operator, id: &str) -> Result<(), AdminError> {
        Self::require_admin(operator)?;
        self.store.delete(&self.students_path, id).await?;
        tracing::info!(student = %id, operator = %operator.email, "student record deleted");
        Ok(())
    }

    /// Full roster, malformed records skipped with a warning.
    pub async fn list_students(&self) -> Result<Vec<Student>, AdminError> {
        let docs = self.store.list(&self.students_path).await?;
        Ok(docs
            .iter()
            .filter_map(|doc| match wire::student_from_doc(doc) {
                Ok(student) => Some(student),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed student record");
                    None
                }
            })
            .collect())
    }

    pub async fn list_users(&self) -> Result<Vec<wire::UserRecord>, AdminError> {
        let docs = self.store.list(&self.users_path).await?;
        Ok(docs
            .iter()
            .filter_map(|doc| match wire::user_from_doc(doc) {
                Ok(user) => Some(user),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed user record");
                    None
                }
            })
            .collect())
    }

    /// Change another operator's role. Partial update; an unknown uid is a
    /// store-level `NotFound`, not an implicit create.
    pub async fn set_role(
        &self,
        operator: &Operator,
        uid: &str,
        role: Role,
    ) -> Result<(), AdminError> {
        Self::require_admin(operator)?;
        let mut fields = presence_store::Fields::new();
        fields.insert("role".into(), role.as_str().into());
        self.store.update(&self.users_path, uid, fields).await?;
        tracing::info!(user = %uid, role = role.as_str(), operator = %operator.email, "role updated");
        Ok(())
    }

    /// Bootstrap the first admin. Only permitted while the users
    /// collection is empty; afterwards role changes go through
    /// [`AdminSurface::set_role`].
    pub async fn seed_admin(&self, uid: &str, email: &str) -> Result<(), AdminError> {
        let existing = self.store.list(&self.users_path).await?;
        if !existing.is_empty() {
            return Err(AdminError::Forbidden);
        }
        self.store
            .put(&self.users_path, uid, wire::user_fields(email, Role::Admin))
            .await?;
        tracing::info!(user = %uid, email, "seeded initial admin");
        Ok(())
    }

    /// One-shot capture for the enrollment form: grab a frame, take the
    /// single best face.
    pub async fn enroll_descriptor(
        &self,
        engine: &dyn FaceEngine,
        source: &mut dyn FrameSource,
        opts: DetectionOpts,
    ) -> Result<Descriptor, AdminError> {
        engine.ensure_ready().await?;
        if !source.ready() {
            return Err(AdminError::Vision(VisionError::SourceUnavailable(
                "enrollment source not ready".into(),
            )));
        }
        let frame = source.grab()?;
        match engine.detect_single(&frame, opts).await? {
            Some(detection) => Ok(detection.descriptor),
            None => Err(AdminError::FaceNotDetected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_core::DESCRIPTOR_LEN;
    use presence_store::MemoryStore;
    use presence_vision::fake::{ScriptedEngine, ScriptedOutcome, StaticFrames};

    fn zero_desc() -> Descriptor {
        Descriptor::from_vec(vec![0.0; DESCRIPTOR_LEN]).unwrap()
    }

    fn admin() -> Operator {
        Operator {
            email: "admin@school".into(),
            role: Role::Admin,
        }
    }

    fn teacher() -> Operator {
        Operator {
            email: "teacher@school".into(),
            role: Role::Teacher,
        }
    }

    fn draft(name: &str) -> StudentDraft {
        StudentDraft {
            id: String::new(),
            name: name.into(),
            class: "7A".into(),
            gender: Gender::Male,
            descriptor: Some(zero_desc()),
        }
    }

    fn surface() -> (AdminSurface, Arc<MemoryStore>, Collections) {
        let store = Arc::new(MemoryStore::new());
        let collections = Collections::new("t1");
        let surface = AdminSurface::new(store.clone(), &collections);
        (surface, store, collections)
    }

    #[tokio::test]
    async fn test_save_and_list_students() {
        let (surface, _, _) = surface();
        let id = surface.save_student(&admin(), &draft("Asha")).await.unwrap();
        assert!(!id.is_empty());

        let students = surface.list_students().await.unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].name, "Asha");
        assert_eq!(students[0].id, id);
    }

    #[tokio::test]
    async fn test_save_with_id_overwrites() {
        let (surface, _, _) = surface();
        let id = surface.save_student(&admin(), &draft("Asha")).await.unwrap();

        let mut edited = draft("Asha Renamed");
        edited.id = id.clone();
        let saved_id = surface.save_student(&admin(), &edited).await.unwrap();
        assert_eq!(saved_id, id);

        let students = surface.list_students().await.unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].name, "Asha Renamed");
    }

    #[tokio::test]
    async fn test_non_admin_cannot_mutate() {
        let (surface, _, _) = surface();
        assert!(matches!(
            surface.save_student(&teacher(), &draft("Asha")).await,
            Err(AdminError::Forbidden)
        ));
        assert!(matches!(
            surface.delete_student(&teacher(), "s1").await,
            Err(AdminError::Forbidden)
        ));
        assert!(matches!(
            surface.set_role(&teacher(), "u1", Role::Admin).await,
            Err(AdminError::Forbidden)
        ));
        assert!(surface.list_students().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_draft_validation() {
        let (surface, _, _) = surface();

        let mut no_name = draft("  ");
        no_name.name = "  ".into();
        assert!(matches!(
            surface.save_student(&admin(), &no_name).await,
            Err(AdminError::MissingField("name"))
        ));

        let mut no_class = draft("Asha");
        no_class.class = String::new();
        assert!(matches!(
            surface.save_student(&admin(), &no_class).await,
            Err(AdminError::MissingField("class"))
        ));

        let mut no_face = draft("Asha");
        no_face.descriptor = None;
        assert!(matches!(
            surface.save_student(&admin(), &no_face).await,
            Err(AdminError::DescriptorRequired)
        ));
    }

    #[tokio::test]
    async fn test_delete_student() {
        let (surface, _, _) = surface();
        let id = surface.save_student(&admin(), &draft("Asha")).await.unwrap();
        surface.delete_student(&admin(), &id).await.unwrap();
        assert!(surface.list_students().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_seed_admin_only_on_empty_directory() {
        let (surface, _, _) = surface();
        surface.seed_admin("u1", "root@school").await.unwrap();

        let users = surface.list_users().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].role, Role::Admin);

        assert!(matches!(
            surface.seed_admin("u2", "other@school").await,
            Err(AdminError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_set_role_updates_existing_user() {
        let (surface, _, _) = surface();
        surface.seed_admin("u1", "root@school").await.unwrap();
        surface.set_role(&admin(), "u1", Role::Teacher).await.unwrap();

        let users = surface.list_users().await.unwrap();
        assert_eq!(users[0].role, Role::Teacher);

        assert!(matches!(
            surface.set_role(&admin(), "missing", Role::Admin).await,
            Err(AdminError::Store(StoreError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_enroll_descriptor_happy_path() {
        let (surface, _, _) = surface();
        let engine = ScriptedEngine::new(vec![ScriptedOutcome::face(zero_desc())]);
        let (mut source, _) = StaticFrames::ready_source();

        let descriptor = surface
            .enroll_descriptor(&engine, &mut source, DetectionOpts::default())
            .await
            .unwrap();
        assert_eq!(descriptor, zero_desc());
    }

    #[tokio::test]
    async fn test_enroll_descriptor_no_face() {
        let (surface, _, _) = surface();
        let engine = ScriptedEngine::new(vec![ScriptedOutcome::none()]);
        let (mut source, _) = StaticFrames::ready_source();

        assert!(matches!(
            surface
                .enroll_descriptor(&engine, &mut source, DetectionOpts::default())
                .await,
            Err(AdminError::FaceNotDetected)
        ));
    }

    #[tokio::test]
    async fn test_enroll_descriptor_source_not_ready() {
        let (surface, _, _) = surface();
        let engine = ScriptedEngine::new(vec![ScriptedOutcome::face(zero_desc())]);
        let (mut source, _) = StaticFrames::not_ready_source();

        assert!(matches!(
            surface
                .enroll_descriptor(&engine, &mut source, DetectionOpts::default())
                .await,
            Err(AdminError::Vision(VisionError::SourceUnavailable(_)))
        ));
    }
}
