use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::answer::AnswerPayload;
use crate::models::assessment_session::{AssessmentAnswer, AssessmentSession};
use crate::models::blueprint::TestBlueprint;
use crate::models::question::{Difficulty, Question, QuestionIntegrityError};
use crate::models::target::{AssessmentTarget, TargetKind, TargetRef, TestAssessment};
use crate::models::test_session::{
    NewSessionQuestion, NewTestSession, SessionStatus, TestSession, TestSessionAnswer,
    TestSessionQuestion,
};
use crate::services::grading_service::{GradableAnswer, Marker, MarkingInput};
use crate::store::{AssessmentSessionStore, QuestionBankReader, TargetStore, TestSessionStore};

/// Process-local store. Every operation runs under one lock, which gives it
/// the same all-or-nothing behaviour as a Postgres transaction.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    questions: BTreeMap<i64, Question>,
    targets: HashMap<TargetRef, AssessmentTarget>,
    blueprints: Vec<TestBlueprint>,
    test_sessions: HashMap<Uuid, TestSession>,
    session_questions: Vec<TestSessionQuestion>,
    test_answers: HashMap<Uuid, TestSessionAnswer>,
    assessment_sessions: HashMap<Uuid, AssessmentSession>,
    assessment_answers: Vec<AssessmentAnswer>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Internal("memory store lock poisoned".to_string()))
    }

    pub fn insert_question(&self, question: Question) -> Result<()> {
        question.check_payload()?;
        self.lock()?.questions.insert(question.id, question);
        Ok(())
    }

    pub fn insert_target(&self, target: AssessmentTarget) -> Result<()> {
        self.lock()?.targets.insert(target.target_ref(), target);
        Ok(())
    }

    pub fn insert_test_assessment(&self, test: TestAssessment) -> Result<()> {
        self.insert_target(AssessmentTarget::TimedTest(test))
    }

    pub fn insert_blueprint(&self, blueprint: TestBlueprint) -> Result<()> {
        blueprint.rules.validate()?;
        self.lock()?.blueprints.push(blueprint);
        Ok(())
    }

    pub fn deactivate_question(&self, question_id: i64) -> Result<()> {
        if let Some(q) = self.lock()?.questions.get_mut(&question_id) {
            q.is_active = false;
        }
        Ok(())
    }

    /// Moves a session's start time, used to simulate an elapsed timer.
    pub fn backdate_test_session(&self, session_id: Uuid, started_at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.lock()?;
        let session = inner
            .test_sessions
            .get_mut(&session_id)
            .ok_or(Error::NoTestSession(session_id))?;
        session.started_at = started_at;
        Ok(())
    }
}

impl Inner {
    fn duration_for(&self, test_assessment_id: i64) -> Option<i32> {
        match self
            .targets
            .get(&TargetRef::new(TargetKind::Test, test_assessment_id))
        {
            Some(AssessmentTarget::TimedTest(t)) => t.duration_minutes,
            _ => None,
        }
    }

    fn read_session(&self, session_id: Uuid) -> Option<TestSession> {
        self.test_sessions.get(&session_id).map(|s| TestSession {
            duration_minutes: self.duration_for(s.test_assessment_id),
            ..s.clone()
        })
    }

    fn bank_question(&self, question_id: i64) -> std::result::Result<Question, QuestionIntegrityError> {
        self.questions
            .get(&question_id)
            .cloned()
            .ok_or(QuestionIntegrityError::Missing(question_id))
    }

    fn active_pool(&self, target: TargetRef) -> Vec<i64> {
        self.questions
            .values()
            .filter(|q| q.is_active && q.owner == target)
            .map(|q| q.id)
            .collect()
    }
}

#[async_trait]
impl QuestionBankReader for MemoryStore {
    async fn pool_for(
        &self,
        target: TargetRef,
        difficulty: Option<Difficulty>,
    ) -> Result<Vec<Question>> {
        let inner = self.lock()?;
        Ok(inner
            .questions
            .values()
            .filter(|q| q.is_active && q.owner == target)
            .filter(|q| difficulty.map_or(true, |d| q.difficulty == Some(d)))
            .cloned()
            .collect())
    }

    async fn question(&self, question_id: i64) -> Result<Option<Question>> {
        Ok(self.lock()?.questions.get(&question_id).cloned())
    }
}

#[async_trait]
impl TargetStore for MemoryStore {
    async fn test_assessment_for_category(
        &self,
        category_id: i64,
    ) -> Result<Option<TestAssessment>> {
        let inner = self.lock()?;
        Ok(inner.targets.values().find_map(|t| match t {
            AssessmentTarget::TimedTest(test) if test.category_id == category_id => {
                Some(test.clone())
            }
            _ => None,
        }))
    }

    async fn find_target(&self, target: TargetRef) -> Result<Option<AssessmentTarget>> {
        Ok(self.lock()?.targets.get(&target).cloned())
    }

    async fn active_blueprint(
        &self,
        test_assessment_id: i64,
        difficulty: Difficulty,
    ) -> Result<Option<TestBlueprint>> {
        let inner = self.lock()?;
        Ok(inner
            .blueprints
            .iter()
            .filter(|b| {
                b.is_active && b.test_assessment_id == test_assessment_id && b.difficulty == difficulty
            })
            .max_by_key(|b| b.id)
            .cloned())
    }
}

#[async_trait]
impl TestSessionStore for MemoryStore {
    async fn create_test_session(
        &self,
        session: NewTestSession,
        questions: Vec<NewSessionQuestion>,
        started_at: DateTime<Utc>,
    ) -> Result<TestSession> {
        let mut inner = self.lock()?;

        let mut seen = std::collections::HashSet::new();
        for q in &questions {
            if !seen.insert(q.question_id) {
                return Err(Error::Internal(format!(
                    "question {} selected twice for one session",
                    q.question_id
                )));
            }
        }

        let row = TestSession {
            id: Uuid::new_v4(),
            user_id: session.user_id,
            test_assessment_id: session.test_assessment_id,
            blueprint_id: session.blueprint_id,
            status: SessionStatus::InProgress,
            started_at,
            submitted_at: None,
            marked_at: None,
            score: rust_decimal::Decimal::ZERO,
            ip_address: session.ip_address,
            user_agent: session.user_agent,
            duration_minutes: None,
        };
        let session_id = row.id;

        inner.session_questions.extend(questions.into_iter().map(|q| TestSessionQuestion {
            id: Uuid::new_v4(),
            test_session_id: session_id,
            question_id: q.question_id,
            question_kind: q.question_kind,
            order: q.order,
            snapshot_text: q.snapshot_text,
            snapshot_options: q.snapshot_options,
        }));
        inner.test_sessions.insert(session_id, row);

        inner
            .read_session(session_id)
            .ok_or(Error::NoTestSession(session_id))
    }

    async fn test_session(&self, session_id: Uuid) -> Result<Option<TestSession>> {
        Ok(self.lock()?.read_session(session_id))
    }

    async fn test_sessions_for_user(&self, user_id: Uuid) -> Result<Vec<TestSession>> {
        let inner = self.lock()?;
        let mut sessions: Vec<_> = inner
            .test_sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .filter_map(|s| inner.read_session(s.id))
            .collect();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(sessions)
    }

    async fn session_questions(&self, session_id: Uuid) -> Result<Vec<TestSessionQuestion>> {
        let inner = self.lock()?;
        let mut questions: Vec<_> = inner
            .session_questions
            .iter()
            .filter(|q| q.test_session_id == session_id)
            .cloned()
            .collect();
        questions.sort_by_key(|q| q.order);
        Ok(questions)
    }

    async fn session_question(
        &self,
        session_id: Uuid,
        question_id: i64,
    ) -> Result<Option<TestSessionQuestion>> {
        let inner = self.lock()?;
        Ok(inner
            .session_questions
            .iter()
            .find(|q| q.test_session_id == session_id && q.question_id == question_id)
            .cloned())
    }

    async fn session_answers(&self, session_id: Uuid) -> Result<Vec<TestSessionAnswer>> {
        let inner = self.lock()?;
        Ok(inner
            .session_questions
            .iter()
            .filter(|q| q.test_session_id == session_id)
            .filter_map(|q| inner.test_answers.get(&q.id).cloned())
            .collect())
    }

    async fn upsert_test_answer(
        &self,
        session_id: Uuid,
        session_question_id: Uuid,
        payload: AnswerPayload,
        answered_at: DateTime<Utc>,
    ) -> Result<TestSessionAnswer> {
        let mut inner = self.lock()?;
        let session = inner
            .test_sessions
            .get(&session_id)
            .ok_or(Error::NoTestSession(session_id))?;
        if session.is_submitted() {
            return Err(Error::AlreadySubmitted(session_id));
        }

        let answer = match inner.test_answers.get(&session_question_id) {
            Some(existing) => TestSessionAnswer {
                payload,
                is_correct: None,
                answered_at,
                ..existing.clone()
            },
            None => TestSessionAnswer {
                id: Uuid::new_v4(),
                session_question_id,
                payload,
                is_correct: None,
                answered_at,
            },
        };
        inner.test_answers.insert(session_question_id, answer.clone());
        Ok(answer)
    }

    async fn submit_test_session(
        &self,
        session_id: Uuid,
        submitted_at: DateTime<Utc>,
        marker: &Marker,
    ) -> Result<TestSession> {
        let mut inner = self.lock()?;
        let session = inner
            .test_sessions
            .get(&session_id)
            .ok_or(Error::NoTestSession(session_id))?;
        if session.is_submitted() {
            return Err(Error::AlreadySubmitted(session_id));
        }

        let session_questions: Vec<_> = inner
            .session_questions
            .iter()
            .filter(|q| q.test_session_id == session_id)
            .collect();
        let answers = session_questions
            .iter()
            .filter_map(|sq| {
                inner.test_answers.get(&sq.id).map(|a| GradableAnswer {
                    answer_id: a.id,
                    question_id: sq.question_id,
                    payload: a.payload.clone(),
                    question: inner.bank_question(sq.question_id),
                })
            })
            .collect();
        let input = MarkingInput {
            session_id,
            total_questions: session_questions.len(),
            answers,
        };

        let outcome = marker(&input);
        let inner = &mut *inner;
        let session = inner
            .test_sessions
            .get_mut(&session_id)
            .ok_or(Error::NoTestSession(session_id))?;
        session.submitted_at = Some(submitted_at);

        let marking = match outcome {
            Ok(marking) => marking,
            Err(err) => {
                session.status = SessionStatus::Error;
                return Err(err);
            }
        };

        session.status = SessionStatus::Submitted;
        session.score = marking.score;
        session.marked_at = Some(submitted_at);
        let verdicts: HashMap<Uuid, bool> = marking.verdicts.into_iter().collect();
        for answer in inner.test_answers.values_mut() {
            if let Some(verdict) = verdicts.get(&answer.id) {
                answer.is_correct = Some(*verdict);
            }
        }

        inner
            .read_session(session_id)
            .ok_or(Error::NoTestSession(session_id))
    }
}

#[async_trait]
impl AssessmentSessionStore for MemoryStore {
    async fn open_assessment_session(
        &self,
        user_id: Uuid,
        target: TargetRef,
        now: DateTime<Utc>,
    ) -> Result<AssessmentSession> {
        let mut inner = self.lock()?;
        let open = inner
            .assessment_sessions
            .values()
            .find(|s| s.user_id == user_id && s.target == target && !s.is_completed())
            .cloned();

        match open {
            Some(session) => {
                inner
                    .assessment_answers
                    .retain(|a| a.assessment_session_id != session.id);
                Ok(session)
            }
            None => {
                let session = AssessmentSession {
                    id: Uuid::new_v4(),
                    user_id,
                    target,
                    started_at: now,
                    completed_at: None,
                    score: None,
                };
                inner.assessment_sessions.insert(session.id, session.clone());
                Ok(session)
            }
        }
    }

    async fn assessment_session(&self, session_id: Uuid) -> Result<Option<AssessmentSession>> {
        Ok(self.lock()?.assessment_sessions.get(&session_id).cloned())
    }

    async fn assessment_answers(&self, session_id: Uuid) -> Result<Vec<AssessmentAnswer>> {
        let inner = self.lock()?;
        Ok(inner
            .assessment_answers
            .iter()
            .filter(|a| a.assessment_session_id == session_id)
            .cloned()
            .collect())
    }

    async fn upsert_assessment_answer(
        &self,
        session_id: Uuid,
        question_id: i64,
        payload: AnswerPayload,
        answered_at: DateTime<Utc>,
    ) -> Result<AssessmentAnswer> {
        let mut inner = self.lock()?;
        let session = inner
            .assessment_sessions
            .get(&session_id)
            .ok_or(Error::NoAssessmentSession(session_id))?;
        if session.is_completed() {
            return Err(Error::AlreadySubmitted(session_id));
        }

        let existing = inner
            .assessment_answers
            .iter_mut()
            .find(|a| a.assessment_session_id == session_id && a.question_id == question_id);
        if let Some(answer) = existing {
            answer.payload = payload;
            answer.is_correct = None;
            answer.answered_at = answered_at;
            return Ok(answer.clone());
        }

        let answer = AssessmentAnswer {
            id: Uuid::new_v4(),
            assessment_session_id: session_id,
            question_id,
            payload,
            is_correct: None,
            answered_at,
        };
        inner.assessment_answers.push(answer.clone());
        Ok(answer)
    }

    async fn complete_assessment_session(
        &self,
        session_id: Uuid,
        completed_at: DateTime<Utc>,
        marker: &Marker,
    ) -> Result<AssessmentSession> {
        let mut inner = self.lock()?;
        let session = inner
            .assessment_sessions
            .get(&session_id)
            .cloned()
            .ok_or(Error::NoAssessmentSession(session_id))?;
        if session.is_completed() {
            return Err(Error::AlreadySubmitted(session_id));
        }

        let pool = inner.active_pool(session.target);
        let answers = inner
            .assessment_answers
            .iter()
            .filter(|a| a.assessment_session_id == session_id && pool.contains(&a.question_id))
            .map(|a| GradableAnswer {
                answer_id: a.id,
                question_id: a.question_id,
                payload: a.payload.clone(),
                question: inner.bank_question(a.question_id),
            })
            .collect();
        let marking = marker(&MarkingInput {
            session_id,
            total_questions: pool.len(),
            answers,
        })?;

        let verdicts: HashMap<Uuid, bool> = marking.verdicts.into_iter().collect();
        for answer in inner.assessment_answers.iter_mut() {
            if let Some(verdict) = verdicts.get(&answer.id) {
                answer.is_correct = Some(*verdict);
            }
        }
        let stored = inner
            .assessment_sessions
            .get_mut(&session_id)
            .ok_or(Error::NoAssessmentSession(session_id))?;
        stored.completed_at = Some(completed_at);
        stored.score = Some(marking.score);
        Ok(stored.clone())
    }
}
