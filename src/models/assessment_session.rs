use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::answer::AnswerPayload;
use crate::models::target::TargetRef;

/// Untimed attempt at a lesson, module or course quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub target: TargetRef,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub score: Option<Decimal>,
}

impl AssessmentSession {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentAnswer {
    pub id: Uuid,
    pub assessment_session_id: Uuid,
    pub question_id: i64,
    pub payload: AnswerPayload,
    pub is_correct: Option<bool>,
    pub answered_at: DateTime<Utc>,
}
