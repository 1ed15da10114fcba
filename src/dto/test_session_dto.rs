use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::question::{Difficulty, OptionView, QuestionKind};
use crate::models::target::CompletionSubject;
use crate::models::test_session::{SessionStatus, TestSession, TestSessionQuestion};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct StartTestSessionRequest {
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SnapshotQuestion {
    pub id: i64,
    pub kind: QuestionKind,
    pub text: String,
    pub options: Vec<OptionView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderedQuestion {
    pub order: i32,
    pub question: SnapshotQuestion,
}

impl From<TestSessionQuestion> for OrderedQuestion {
    fn from(q: TestSessionQuestion) -> Self {
        Self {
            order: q.order,
            question: SnapshotQuestion {
                id: q.question_id,
                kind: q.question_kind,
                text: q.snapshot_text,
                options: q.snapshot_options,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StartTestSessionResponse {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_minutes: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
    pub questions: Vec<OrderedQuestion>,
}

impl StartTestSessionResponse {
    pub fn new(session: &TestSession, questions: Vec<TestSessionQuestion>) -> Self {
        Self {
            session_id: session.id,
            started_at: session.started_at,
            duration_minutes: session.duration_minutes,
            expires_at: session.expires_at(),
            questions: questions.into_iter().map(OrderedQuestion::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TestSessionDetailResponse {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub is_expired: bool,
    pub score: Decimal,
    pub questions: Vec<OrderedQuestion>,
}

impl TestSessionDetailResponse {
    pub fn new(session: &TestSession, questions: Vec<TestSessionQuestion>, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session.id,
            status: session.status,
            started_at: session.started_at,
            submitted_at: session.submitted_at,
            duration_minutes: session.duration_minutes,
            is_expired: session.is_overdue_at(now),
            score: session.score,
            questions: questions.into_iter().map(OrderedQuestion::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TestSessionSummary {
    pub session_id: Uuid,
    pub test_assessment_id: i64,
    pub status: SessionStatus,
    pub score: Decimal,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub is_expired: bool,
}

impl TestSessionSummary {
    pub fn new(session: &TestSession, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session.id,
            test_assessment_id: session.test_assessment_id,
            status: session.status,
            score: session.score,
            started_at: session.started_at,
            submitted_at: session.submitted_at,
            is_expired: session.is_overdue_at(now),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SaveAnswerRequest {
    #[validate(range(min = 1))]
    pub question_id: i64,
    /// Option id for multiple-choice questions, text otherwise.
    #[schema(value_type = Object)]
    pub answer: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitTestSessionResponse {
    pub success: bool,
    pub message: String,
    pub score: Decimal,
    pub passed: bool,
    pub next_step: CompletionSubject,
}
