use axum::Json;
use utoipa::OpenApi;

use crate::dto::assessment_dto::{
    AssessmentSessionResponse, StartAssessmentSessionResponse, SubmitAssessmentResponse,
};
use crate::dto::test_session_dto::{
    MessageResponse, OrderedQuestion, SaveAnswerRequest, SnapshotQuestion, StartTestSessionRequest,
    StartTestSessionResponse, SubmitTestSessionResponse, TestSessionDetailResponse,
    TestSessionSummary,
};
use crate::models::question::{Difficulty, OptionView, QuestionKind, QuestionView};
use crate::models::target::{CompletionSubject, TargetKind, TargetRef};
use crate::models::test_session::SessionStatus;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::health,
        crate::routes::test_sessions::start_test_session,
        crate::routes::test_sessions::list_test_sessions,
        crate::routes::test_sessions::get_test_session,
        crate::routes::test_sessions::save_test_answer,
        crate::routes::test_sessions::submit_test_session,
        crate::routes::assessments::start_assessment_session,
        crate::routes::assessments::get_assessment_session,
        crate::routes::assessments::save_assessment_answer,
        crate::routes::assessments::submit_assessment_session,
    ),
    components(schemas(
        StartTestSessionRequest,
        StartTestSessionResponse,
        TestSessionDetailResponse,
        TestSessionSummary,
        OrderedQuestion,
        SnapshotQuestion,
        SaveAnswerRequest,
        MessageResponse,
        SubmitTestSessionResponse,
        StartAssessmentSessionResponse,
        AssessmentSessionResponse,
        SubmitAssessmentResponse,
        QuestionView,
        OptionView,
        QuestionKind,
        Difficulty,
        SessionStatus,
        TargetRef,
        TargetKind,
        CompletionSubject,
    )),
    tags((name = "assessment-engine", description = "Timed tests and course quizzes"))
)]
pub struct ApiDoc;

pub async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
