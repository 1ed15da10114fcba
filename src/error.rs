use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;
use uuid::Uuid;

use crate::models::question::{Difficulty, QuestionIntegrityError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("There is no test available for category {0}")]
    NoTestAssessment(i64),

    #[error("There is no quiz for lesson assessment {0}")]
    NoLessonAssessment(i64),

    #[error("There is no quiz for module assessment {0}")]
    NoModuleAssessment(i64),

    #[error("There is no quiz for course assessment {0}")]
    NoCourseAssessment(i64),

    #[error("There is no {difficulty} test available for test assessment {test_assessment_id}")]
    NoTestBlueprint {
        test_assessment_id: i64,
        difficulty: Difficulty,
    },

    #[error("Test session {0} not found")]
    NoTestSession(Uuid),

    #[error("Assessment session {0} not found")]
    NoAssessmentSession(Uuid),

    #[error("Question {question_id} is not part of session {session_id}")]
    QuestionNotInSession { session_id: Uuid, question_id: i64 },

    #[error("You are not authorized to access this session")]
    NotOwner,

    #[error("Session {0} has already been submitted")]
    AlreadySubmitted(Uuid),

    #[error("Session {0} has expired and was submitted automatically")]
    TestSessionExpired(Uuid),

    #[error("Marking failed for session {session_id}: {reason}")]
    TestSessionMarking { session_id: Uuid, reason: String },

    #[error("Invalid answer: {0}")]
    InvalidAnswer(String),

    #[error("Invalid question: {0}")]
    InvalidQuestion(#[from] QuestionIntegrityError),

    #[error("Invalid blueprint: {0}")]
    InvalidBlueprint(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code sent alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "config_error",
            Error::BadRequest(_) => "bad_request",
            Error::Unauthorized(_) => "unauthorized",
            Error::NoTestAssessment(_) => "no_test_assessment",
            Error::NoLessonAssessment(_) => "no_lesson_assessment",
            Error::NoModuleAssessment(_) => "no_module_assessment",
            Error::NoCourseAssessment(_) => "no_course_assessment",
            Error::NoTestBlueprint { .. } => "no_test_blueprint",
            Error::NoTestSession(_) => "no_test_session",
            Error::NoAssessmentSession(_) => "no_assessment_session",
            Error::QuestionNotInSession { .. } => "question_not_in_session",
            Error::NotOwner => "not_owner",
            Error::AlreadySubmitted(_) => "already_submitted",
            Error::TestSessionExpired(_) => "test_session_expired",
            Error::TestSessionMarking { .. } => "test_session_marking_failed",
            Error::InvalidAnswer(_) => "invalid_answer",
            Error::InvalidQuestion(_) => "invalid_question",
            Error::InvalidBlueprint(_) => "invalid_blueprint",
            Error::NotFound(_) => "not_found",
            Error::Validation(_) => "validation_error",
            Error::Json(_) => "invalid_json",
            Error::Database(_) | Error::Migration(_) | Error::Anyhow(_) | Error::Internal(_) => {
                "internal_error"
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) | Error::InvalidAnswer(_) | Error::Validation(_) | Error::Json(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::NotOwner | Error::TestSessionExpired(_) => StatusCode::FORBIDDEN,
            Error::NoTestAssessment(_)
            | Error::NoLessonAssessment(_)
            | Error::NoModuleAssessment(_)
            | Error::NoCourseAssessment(_)
            | Error::NoTestBlueprint { .. }
            | Error::NoTestSession(_)
            | Error::NoAssessmentSession(_)
            | Error::QuestionNotInSession { .. }
            | Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::AlreadySubmitted(_) => StatusCode::CONFLICT,
            Error::InvalidQuestion(_) | Error::InvalidBlueprint(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Error::Config(_)
            | Error::TestSessionMarking { .. }
            | Error::Database(_)
            | Error::Migration(_)
            | Error::Anyhow(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let message = match &self {
            Error::Database(_) | Error::Migration(_) | Error::Anyhow(_) | Error::Internal(_) => {
                tracing::error!(error = %self, "request failed");
                "An unexpected error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({ "error": self.code(), "message": message }));
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("Resource not found".to_string()),
            other => Error::Database(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_precise_statuses() {
        let id = Uuid::new_v4();
        assert_eq!(Error::NoTestAssessment(3).status(), StatusCode::NOT_FOUND);
        assert_eq!(Error::AlreadySubmitted(id).status(), StatusCode::CONFLICT);
        assert_eq!(Error::TestSessionExpired(id).status(), StatusCode::FORBIDDEN);
        assert_eq!(Error::TestSessionExpired(id).code(), "test_session_expired");
        assert_eq!(Error::NotOwner.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn row_not_found_becomes_not_found() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
