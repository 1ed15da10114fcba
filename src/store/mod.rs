//! Storage traits for the assessment engine.
//!
//! Each write operation is atomic on its own: implementations wrap it in one
//! transaction (Postgres) or one critical section (memory).

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::models::answer::AnswerPayload;
use crate::models::assessment_session::{AssessmentAnswer, AssessmentSession};
use crate::models::blueprint::TestBlueprint;
use crate::models::question::{Difficulty, Question};
use crate::models::target::{AssessmentTarget, TargetRef, TestAssessment};
use crate::models::test_session::{
    NewSessionQuestion, NewTestSession, TestSession, TestSessionAnswer, TestSessionQuestion,
};
use crate::services::grading_service::Marker;

/// Read path into the question bank.
#[async_trait]
pub trait QuestionBankReader: Send + Sync {
    /// Active questions owned by `target`, optionally narrowed to one tier.
    async fn pool_for(
        &self,
        target: TargetRef,
        difficulty: Option<Difficulty>,
    ) -> Result<Vec<Question>>;

    async fn question(&self, question_id: i64) -> Result<Option<Question>>;
}

#[async_trait]
pub trait TargetStore: Send + Sync {
    async fn test_assessment_for_category(&self, category_id: i64)
        -> Result<Option<TestAssessment>>;

    async fn find_target(&self, target: TargetRef) -> Result<Option<AssessmentTarget>>;

    async fn active_blueprint(
        &self,
        test_assessment_id: i64,
        difficulty: Difficulty,
    ) -> Result<Option<TestBlueprint>>;
}

#[async_trait]
pub trait TestSessionStore: Send + Sync {
    /// Inserts the session and its question snapshots together, or nothing.
    async fn create_test_session(
        &self,
        session: NewTestSession,
        questions: Vec<NewSessionQuestion>,
        started_at: DateTime<Utc>,
    ) -> Result<TestSession>;

    async fn test_session(&self, session_id: Uuid) -> Result<Option<TestSession>>;

    /// Newest first.
    async fn test_sessions_for_user(&self, user_id: Uuid) -> Result<Vec<TestSession>>;

    /// Ordered by `order`.
    async fn session_questions(&self, session_id: Uuid) -> Result<Vec<TestSessionQuestion>>;

    async fn session_question(
        &self,
        session_id: Uuid,
        question_id: i64,
    ) -> Result<Option<TestSessionQuestion>>;

    async fn session_answers(&self, session_id: Uuid) -> Result<Vec<TestSessionAnswer>>;

    /// Insert-or-replace the answer to one session question. Fails with
    /// `AlreadySubmitted` once the session has been submitted.
    async fn upsert_test_answer(
        &self,
        session_id: Uuid,
        session_question_id: Uuid,
        payload: AnswerPayload,
        answered_at: DateTime<Utc>,
    ) -> Result<TestSessionAnswer>;

    /// Locks the session, stamps `submitted_at`, runs `marker` over the
    /// recorded answers and stores the verdicts and score. If marking fails
    /// nothing from it is kept: the session is left in `ERROR` and the
    /// marker's error is returned.
    async fn submit_test_session(
        &self,
        session_id: Uuid,
        submitted_at: DateTime<Utc>,
        marker: &Marker,
    ) -> Result<TestSession>;
}

#[async_trait]
pub trait AssessmentSessionStore: Send + Sync {
    /// Returns the user's open session for `target`, clearing its answers,
    /// or creates one.
    async fn open_assessment_session(
        &self,
        user_id: Uuid,
        target: TargetRef,
        now: DateTime<Utc>,
    ) -> Result<AssessmentSession>;

    async fn assessment_session(&self, session_id: Uuid) -> Result<Option<AssessmentSession>>;

    async fn assessment_answers(&self, session_id: Uuid) -> Result<Vec<AssessmentAnswer>>;

    async fn upsert_assessment_answer(
        &self,
        session_id: Uuid,
        question_id: i64,
        payload: AnswerPayload,
        answered_at: DateTime<Utc>,
    ) -> Result<AssessmentAnswer>;

    /// Marks the session against the target's active pool and completes it.
    /// On marking failure the session stays open and unchanged.
    async fn complete_assessment_session(
        &self,
        session_id: Uuid,
        completed_at: DateTime<Utc>,
        marker: &Marker,
    ) -> Result<AssessmentSession>;
}

/// The four storage seams, usually backed by one store.
#[derive(Clone)]
pub struct Stores {
    pub bank: Arc<dyn QuestionBankReader>,
    pub targets: Arc<dyn TargetStore>,
    pub tests: Arc<dyn TestSessionStore>,
    pub assessments: Arc<dyn AssessmentSessionStore>,
}

impl Stores {
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: QuestionBankReader + TargetStore + TestSessionStore + AssessmentSessionStore + 'static,
    {
        Self {
            bank: store.clone(),
            targets: store.clone(),
            tests: store.clone(),
            assessments: store,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_traits_are_object_safe() {
        fn _bank(_: Box<dyn QuestionBankReader>) {}
        fn _targets(_: Box<dyn TargetStore>) {}
        fn _tests(_: Box<dyn TestSessionStore>) {}
        fn _assessments(_: Box<dyn AssessmentSessionStore>) {}
    }
}
