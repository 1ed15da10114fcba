use std::sync::Arc;

use crate::error::{Error, Result};
use crate::models::target::{AssessmentTarget, TargetKind, TargetRef, TestAssessment};
use crate::store::TargetStore;

/// Resolves a `(kind, id)` reference into the assessment that owns it.
#[derive(Clone)]
pub struct TargetService {
    targets: Arc<dyn TargetStore>,
}

impl TargetService {
    pub fn new(targets: Arc<dyn TargetStore>) -> Self {
        Self { targets }
    }

    pub async fn resolve(&self, target: TargetRef) -> Result<AssessmentTarget> {
        let found = self.targets.find_target(target).await?;
        match found {
            Some(resolved) if resolved.target_ref() == target => Ok(resolved),
            _ => Err(not_found(target)),
        }
    }

    pub async fn test_for_category(&self, category_id: i64) -> Result<TestAssessment> {
        self.targets
            .test_assessment_for_category(category_id)
            .await?
            .ok_or(Error::NoTestAssessment(category_id))
    }
}

pub fn not_found(target: TargetRef) -> Error {
    match target.kind {
        TargetKind::Test => Error::NoTestAssessment(target.id),
        TargetKind::Lesson => Error::NoLessonAssessment(target.id),
        TargetKind::Module => Error::NoModuleAssessment(target.id),
        TargetKind::Course => Error::NoCourseAssessment(target.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::target::{CompletionSubject, LessonAssessment};
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn unknown_targets_raise_kind_specific_errors() {
        let service = TargetService::new(Arc::new(MemoryStore::new()));
        let err = service
            .resolve(TargetRef::new(TargetKind::Module, 4))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoModuleAssessment(4)));

        let err = service.test_for_category(12).await.unwrap_err();
        assert!(matches!(err, Error::NoTestAssessment(12)));
    }

    #[tokio::test]
    async fn lesson_quiz_notifies_its_lesson() {
        let store = MemoryStore::new();
        store
            .insert_target(AssessmentTarget::Lesson(LessonAssessment {
                id: 5,
                lesson_id: 50,
                course_id: 500,
            }))
            .unwrap();
        let service = TargetService::new(Arc::new(store));

        let target = service
            .resolve(TargetRef::new(TargetKind::Lesson, 5))
            .await
            .unwrap();
        assert_eq!(
            target.on_complete(),
            CompletionSubject::Lesson {
                lesson_id: 50,
                course_id: 500
            }
        );
        assert_eq!(target.duration_minutes(), None);
    }
}
