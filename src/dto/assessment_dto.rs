use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::question::QuestionView;
use crate::models::target::{CompletionSubject, TargetRef};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StartAssessmentSessionResponse {
    pub assessment_session_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AssessmentSessionResponse {
    pub session_id: Uuid,
    pub target: TargetRef,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub score: Option<Decimal>,
    pub questions: Vec<QuestionView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitAssessmentResponse {
    pub score: Decimal,
    pub passed: bool,
    pub next_step: CompletionSubject,
}
