use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    Extension,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::test_session_dto::{
        MessageResponse, SaveAnswerRequest, StartTestSessionRequest, StartTestSessionResponse,
        SubmitTestSessionResponse, TestSessionDetailResponse, TestSessionSummary,
    },
    error::Result,
    middleware::auth::Claims,
    routes::notify_pass,
    utils::client::client_info,
    AppState,
};

#[utoipa::path(
    post,
    path = "/api/categories/{category_id}/test-sessions",
    params(
        ("category_id" = i64, Path, description = "Category whose timed test is taken")
    ),
    request_body = StartTestSessionRequest,
    responses(
        (status = 201, description = "Session started", body = StartTestSessionResponse),
        (status = 404, description = "No test or no active blueprint for this difficulty")
    )
)]
#[axum::debug_handler]
pub async fn start_test_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(category_id): Path<i64>,
    headers: HeaderMap,
    Json(payload): Json<StartTestSessionRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let user_id = claims.user_id()?;
    let started = state
        .test_session_service
        .start(user_id, category_id, payload.difficulty, client_info(&headers))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(StartTestSessionResponse::new(&started.session, started.questions)),
    ))
}

#[utoipa::path(
    get,
    path = "/api/test-sessions",
    responses(
        (status = 200, description = "The caller's sessions, newest first", body = Vec<TestSessionSummary>)
    )
)]
#[axum::debug_handler]
pub async fn list_test_sessions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let user_id = claims.user_id()?;
    let now = Utc::now();
    let sessions: Vec<TestSessionSummary> = state
        .test_session_service
        .list(user_id)
        .await?
        .iter()
        .map(|s| TestSessionSummary::new(s, now))
        .collect();
    Ok(Json(sessions))
}

#[utoipa::path(
    get,
    path = "/api/test-sessions/{id}",
    params(
        ("id" = Uuid, Path, description = "Test session ID")
    ),
    responses(
        (status = 200, description = "Session with its question snapshot", body = TestSessionDetailResponse),
        (status = 403, description = "Session belongs to another user"),
        (status = 404, description = "Session not found")
    )
)]
#[axum::debug_handler]
pub async fn get_test_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let user_id = claims.user_id()?;
    let found = state.test_session_service.get(user_id, id).await?;
    Ok(Json(TestSessionDetailResponse::new(
        &found.session,
        found.questions,
        Utc::now(),
    )))
}

#[utoipa::path(
    post,
    path = "/api/test-sessions/{id}/answers",
    params(
        ("id" = Uuid, Path, description = "Test session ID")
    ),
    request_body = SaveAnswerRequest,
    responses(
        (status = 200, description = "Answer saved", body = MessageResponse),
        (status = 403, description = "Session expired and was submitted, or belongs to another user"),
        (status = 404, description = "Question is not part of this session"),
        (status = 409, description = "Session already submitted")
    )
)]
#[axum::debug_handler]
pub async fn save_test_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SaveAnswerRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let user_id = claims.user_id()?;
    state
        .answer_service
        .save_test_answer(user_id, id, payload.question_id, &payload.answer)
        .await?;
    Ok(Json(MessageResponse::ok("Answer saved")))
}

#[utoipa::path(
    post,
    path = "/api/test-sessions/{id}/submit",
    params(
        ("id" = Uuid, Path, description = "Test session ID")
    ),
    responses(
        (status = 200, description = "Session submitted and marked", body = SubmitTestSessionResponse),
        (status = 409, description = "Session already submitted"),
        (status = 500, description = "Marking failed; session flagged as ERROR")
    )
)]
#[axum::debug_handler]
pub async fn submit_test_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let user_id = claims.user_id()?;
    let submitted = state.test_session_service.submit(user_id, id).await?;
    if submitted.passed {
        notify_pass(&state, user_id, submitted.next_step).await;
    }
    Ok(Json(SubmitTestSessionResponse {
        success: true,
        message: "Test submitted".to_string(),
        score: submitted.session.score,
        passed: submitted.passed,
        next_step: submitted.next_step,
    }))
}
