use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::assessment_session::AssessmentSession;
use crate::models::question::QuestionView;
use crate::models::target::{AssessmentTarget, CompletionSubject, TargetKind, TargetRef};
use crate::services::grading_service::GradingService;
use crate::services::target_service::TargetService;
use crate::store::Stores;

#[derive(Debug, Clone)]
pub struct AssessmentOutcome {
    pub session: AssessmentSession,
    pub score: Decimal,
    pub passed: bool,
    pub next_step: CompletionSubject,
}

/// Untimed lesson, module and course quizzes. Every active question of the
/// target is part of the session.
#[derive(Clone)]
pub struct AssessmentService {
    stores: Stores,
    targets: TargetService,
    pass_threshold: Decimal,
}

impl AssessmentService {
    pub fn new(stores: Stores, pass_threshold: Decimal) -> Self {
        let targets = TargetService::new(stores.targets.clone());
        Self {
            stores,
            targets,
            pass_threshold,
        }
    }

    pub async fn start(&self, user_id: Uuid, target: TargetRef) -> Result<AssessmentSession> {
        if target.kind == TargetKind::Test {
            return Err(Error::BadRequest(
                "timed tests are started through test sessions".to_string(),
            ));
        }
        self.targets.resolve(target).await?;
        let session = self
            .stores
            .assessments
            .open_assessment_session(user_id, target, Utc::now())
            .await?;
        tracing::info!(session_id = %session.id, %user_id, %target, "assessment session opened");
        Ok(session)
    }

    pub async fn get(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<(AssessmentSession, Vec<QuestionView>)> {
        let session = self.owned_session(user_id, session_id).await?;
        let target = self.targets.resolve(session.target).await?;
        let questions = target
            .question_pool(self.stores.bank.as_ref(), None)
            .await?
            .iter()
            .map(QuestionView::from)
            .collect();
        Ok((session, questions))
    }

    pub async fn submit(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        target: TargetRef,
    ) -> Result<AssessmentOutcome> {
        let session = self.owned_session(user_id, session_id).await?;
        if session.target != target {
            return Err(Error::NoAssessmentSession(session_id));
        }
        if session.is_completed() {
            return Err(Error::AlreadySubmitted(session_id));
        }
        let resolved: AssessmentTarget = self.targets.resolve(target).await?;

        let session = self
            .stores
            .assessments
            .complete_assessment_session(session_id, Utc::now(), &GradingService::mark)
            .await?;
        let score = session.score.unwrap_or(Decimal::ZERO);
        let passed = score >= self.pass_threshold;

        tracing::info!(%session_id, %user_id, %target, %score, passed, "assessment session marked");
        Ok(AssessmentOutcome {
            session,
            score,
            passed,
            next_step: resolved.on_complete(),
        })
    }

    async fn owned_session(&self, user_id: Uuid, session_id: Uuid) -> Result<AssessmentSession> {
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
        Ok(session)
    }
}
