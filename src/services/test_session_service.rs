use chrono::Utc;
use rust_decimal::Decimal;
use std::net::IpAddr;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::question::{Difficulty, QuestionView};
use crate::models::target::{CompletionSubject, TargetKind, TargetRef};
use crate::models::test_session::{NewSessionQuestion, NewTestSession, TestSession, TestSessionQuestion};
use crate::services::blueprint_service::BlueprintSelector;
use crate::services::grading_service::GradingService;
use crate::services::target_service::TargetService;
use crate::store::Stores;

#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<IpAddr>,
    pub user_agent: Option<String>,
}

/// A session together with its frozen questions, in order.
#[derive(Debug, Clone)]
pub struct SessionWithQuestions {
    pub session: TestSession,
    pub questions: Vec<TestSessionQuestion>,
}

#[derive(Debug, Clone)]
pub struct SubmittedSession {
    pub session: TestSession,
    pub passed: bool,
    pub next_step: CompletionSubject,
}

#[derive(Clone)]
pub struct TestSessionService {
    stores: Stores,
    targets: TargetService,
    selector: BlueprintSelector,
    pass_threshold: Decimal,
}

impl TestSessionService {
    pub fn new(stores: Stores, selector: BlueprintSelector, pass_threshold: Decimal) -> Self {
        let targets = TargetService::new(stores.targets.clone());
        Self {
            stores,
            targets,
            selector,
            pass_threshold,
        }
    }

    pub async fn start(
        &self,
        user_id: Uuid,
        category_id: i64,
        difficulty: Difficulty,
        client: ClientInfo,
    ) -> Result<SessionWithQuestions> {
        let test = self.targets.test_for_category(category_id).await?;
        let selection = self
            .selector
            .select_questions(
                self.stores.targets.as_ref(),
                self.stores.bank.as_ref(),
                &test,
                difficulty,
            )
            .await?;

        let snapshots = selection
            .questions
            .iter()
            .zip(1..)
            .map(|(question, order)| NewSessionQuestion {
                question_id: question.id,
                question_kind: question.kind,
                order,
                snapshot_text: question.text.clone(),
                snapshot_options: QuestionView::from(question).options,
            })
            .collect();

        let session = self
            .stores
            .tests
            .create_test_session(
                NewTestSession {
                    user_id,
                    test_assessment_id: test.id,
                    blueprint_id: Some(selection.blueprint.id),
                    ip_address: client.ip_address,
                    user_agent: client.user_agent,
                },
                snapshots,
                Utc::now(),
            )
            .await?;
        let questions = self.stores.tests.session_questions(session.id).await?;

        tracing::info!(
            session_id = %session.id,
            %user_id,
            category_id,
            %difficulty,
            questions = questions.len(),
            pool_size = self.selector.pool_size(),
            "test session started"
        );
        Ok(SessionWithQuestions { session, questions })
    }

    pub async fn get(&self, user_id: Uuid, session_id: Uuid) -> Result<SessionWithQuestions> {
        let session = self.owned_session(user_id, session_id).await?;
        let questions = self.stores.tests.session_questions(session_id).await?;
        Ok(SessionWithQuestions { session, questions })
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<TestSession>> {
        self.stores.tests.test_sessions_for_user(user_id).await
    }

    pub async fn submit(&self, user_id: Uuid, session_id: Uuid) -> Result<SubmittedSession> {
        let session = self.owned_session(user_id, session_id).await?;
        if session.is_submitted() {
            return Err(Error::AlreadySubmitted(session_id));
        }
        if session.is_expired_at(Utc::now()) {
            tracing::info!(%session_id, "submitting a test session past its duration");
        }
        let target = self
            .targets
            .resolve(TargetRef::new(TargetKind::Test, session.test_assessment_id))
            .await?;

        let session = self.force_submit(session_id).await?;
        Ok(SubmittedSession {
            passed: session.score >= self.pass_threshold,
            next_step: target.on_complete(),
            session,
        })
    }

    /// Submits and marks without ownership or expiry checks.
    pub async fn force_submit(&self, session_id: Uuid) -> Result<TestSession> {
        let result = self
            .stores
            .tests
            .submit_test_session(session_id, Utc::now(), &GradingService::mark)
            .await;
        match &result {
            Ok(session) => tracing::info!(
                %session_id,
                score = %session.score,
                "test session submitted"
            ),
            Err(err @ Error::TestSessionMarking { .. }) => tracing::error!(
                %session_id,
                error = %err,
                "marking failed; session flagged as ERROR"
            ),
            Err(_) => {}
        }
        result
    }

    pub async fn owned_session(&self, user_id: Uuid, session_id: Uuid) -> Result<TestSession> {
        let session = self
            .stores
            .tests
            .test_session(session_id)
            .await?
            .ok_or(Error::NoTestSession(session_id))?;
        if session.user_id != user_id {
            tracing::warn!(%session_id, %user_id, "test session accessed by another user");
            return Err(Error::NotOwner);
        }
        Ok(session)
    }
}
