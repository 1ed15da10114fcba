use chrono::Utc;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::answer::AnswerPayload;
use crate::models::assessment_session::AssessmentAnswer;
use crate::models::test_session::TestSessionAnswer;
use crate::services::test_session_service::TestSessionService;
use crate::store::Stores;

/// Records answers for both timed test sessions and untimed assessment
/// sessions. Saving twice for the same question replaces the first answer.
#[derive(Clone)]
pub struct AnswerService {
    stores: Stores,
    sessions: TestSessionService,
}

impl AnswerService {
    pub fn new(stores: Stores, sessions: TestSessionService) -> Self {
        Self { stores, sessions }
    }

    pub async fn save_test_answer(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        question_id: i64,
        raw: &JsonValue,
    ) -> Result<TestSessionAnswer> {
        let session = self.sessions.owned_session(user_id, session_id).await?;
        if session.is_submitted() {
            return Err(Error::AlreadySubmitted(session_id));
        }

        if session.is_expired_at(Utc::now()) {
            tracing::warn!(%session_id, %user_id, "answer arrived after expiry; auto-submitting");
            if let Err(err) = self.sessions.force_submit(session_id).await {
                match err {
                    Error::AlreadySubmitted(_) => {}
                    other => tracing::error!(
                        %session_id,
                        error = %other,
                        "auto-submit of expired session failed"
                    ),
                }
            }
            return Err(Error::TestSessionExpired(session_id));
        }

        let session_question = self
            .stores
            .tests
            .session_question(session_id, question_id)
            .await?
            .ok_or(Error::QuestionNotInSession {
                session_id,
                question_id,
            })?;

        let payload = AnswerPayload::from_raw(session_question.question_kind, raw)?;
        self.stores
            .tests
            .upsert_test_answer(session_id, session_question.id, payload, Utc::now())
            .await
    }

    pub async fn save_assessment_answer(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        question_id: i64,
        raw: &JsonValue,
    ) -> Result<AssessmentAnswer> {
        let session = self
            .stores
            .assessments
            .assessment_session(session_id)
            .await?
            .ok_or(Error::NoAssessmentSession(session_id))?;
        if session.user_id != user_id {
            tracing::warn!(%session_id, %user_id, "assessment session accessed by another user");
            return Err(Error::NotOwner);
        }
        if session.is_completed() {
            return Err(Error::AlreadySubmitted(session_id));
        }

        let not_in_session = || Error::QuestionNotInSession {
            session_id,
            question_id,
        };
        let question = self
            .stores
            .bank
            .question(question_id)
            .await?
            .ok_or_else(not_in_session)?;
        if !question.is_active || question.owner != session.target {
            return Err(not_in_session());
        }

        let payload = AnswerPayload::from_raw(question.kind, raw)?;
        self.stores
            .assessments
            .upsert_assessment_answer(session_id, question_id, payload, Utc::now())
            .await
    }
}
