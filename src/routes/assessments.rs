use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
    Extension,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::assessment_dto::{
        AssessmentSessionResponse, StartAssessmentSessionResponse, SubmitAssessmentResponse,
    },
    dto::test_session_dto::{MessageResponse, SaveAnswerRequest},
    error::{Error, Result},
    middleware::auth::Claims,
    models::target::{TargetKind, TargetRef},
    routes::notify_pass,
    AppState,
};

fn target_ref(kind: &str, target_id: i64) -> Result<TargetRef> {
    let kind = kind.parse::<TargetKind>().map_err(Error::BadRequest)?;
    Ok(TargetRef::new(kind, target_id))
}

#[utoipa::path(
    post,
    path = "/api/assessments/{kind}/{target_id}/sessions",
    params(
        ("kind" = String, Path, description = "lesson, module or course"),
        ("target_id" = i64, Path, description = "Assessment ID")
    ),
    responses(
        (status = 200, description = "Open session for this assessment", body = StartAssessmentSessionResponse),
        (status = 404, description = "No such assessment")
    )
)]
#[axum::debug_handler]
pub async fn start_assessment_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((kind, target_id)): Path<(String, i64)>,
) -> Result<impl IntoResponse> {
    let user_id = claims.user_id()?;
    let session = state
        .assessment_service
        .start(user_id, target_ref(&kind, target_id)?)
        .await?;
    Ok(Json(StartAssessmentSessionResponse {
        assessment_session_id: session.id,
    }))
}

#[utoipa::path(
    get,
    path = "/api/assessment-sessions/{id}",
    params(
        ("id" = Uuid, Path, description = "Assessment session ID")
    ),
    responses(
        (status = 200, description = "Session and the assessment's questions", body = AssessmentSessionResponse),
        (status = 404, description = "Session not found")
    )
)]
#[axum::debug_handler]
pub async fn get_assessment_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let user_id = claims.user_id()?;
    let (session, questions) = state.assessment_service.get(user_id, id).await?;
    Ok(Json(AssessmentSessionResponse {
        session_id: session.id,
        target: session.target,
        started_at: session.started_at,
        completed_at: session.completed_at,
        score: session.score,
        questions,
    }))
}

#[utoipa::path(
    post,
    path = "/api/assessment-sessions/{id}/answers",
    params(
        ("id" = Uuid, Path, description = "Assessment session ID")
    ),
    request_body = SaveAnswerRequest,
    responses(
        (status = 200, description = "Answer saved", body = MessageResponse),
        (status = 404, description = "Question does not belong to this assessment"),
        (status = 409, description = "Session already completed")
    )
)]
#[axum::debug_handler]
pub async fn save_assessment_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SaveAnswerRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let user_id = claims.user_id()?;
    state
        .answer_service
        .save_assessment_answer(user_id, id, payload.question_id, &payload.answer)
        .await?;
    Ok(Json(MessageResponse::ok("Answer saved")))
}

#[utoipa::path(
    post,
    path = "/api/assessments/{kind}/{target_id}/sessions/{session_id}/submit",
    params(
        ("kind" = String, Path, description = "lesson, module or course"),
        ("target_id" = i64, Path, description = "Assessment ID"),
        ("session_id" = Uuid, Path, description = "Assessment session ID")
    ),
    responses(
        (status = 200, description = "Session marked", body = SubmitAssessmentResponse),
        (status = 404, description = "No such session for this assessment"),
        (status = 409, description = "Session already completed")
    )
)]
#[axum::debug_handler]
pub async fn submit_assessment_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((kind, target_id, session_id)): Path<(String, i64, Uuid)>,
) -> Result<impl IntoResponse> {
    let user_id = claims.user_id()?;
    let outcome = state
        .assessment_service
        .submit(user_id, session_id, target_ref(&kind, target_id)?)
        .await?;
    if outcome.passed {
        notify_pass(&state, user_id, outcome.next_step).await;
    }
    Ok(Json(SubmitAssessmentResponse {
        score: outcome.score,
        passed: outcome.passed,
        next_step: outcome.next_step,
    }))
}
