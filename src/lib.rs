pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
pub mod utils;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::config::Config;
use crate::services::{
    answer_service::AnswerService,
    assessment_service::AssessmentService,
    blueprint_service::BlueprintSelector,
    notifier::{CourseProgressNotifier, TracingNotifier},
    test_session_service::TestSessionService,
};
use crate::store::Stores;

#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub test_session_service: TestSessionService,
    pub answer_service: AnswerService,
    pub assessment_service: AssessmentService,
    pub notifier: Arc<dyn CourseProgressNotifier>,
    pub jwt_secret: String,
}

impl AppState {
    pub fn new(stores: Stores, config: &Config) -> Self {
        let selector = match config.selection_seed {
            Some(seed) => BlueprintSelector::seeded(config.questions_per_session, seed),
            None => BlueprintSelector::new(config.questions_per_session),
        };

        let test_session_service =
            TestSessionService::new(stores.clone(), selector, config.pass_threshold);
        let answer_service = AnswerService::new(stores.clone(), test_session_service.clone());
        let assessment_service = AssessmentService::new(stores.clone(), config.pass_threshold);

        Self {
            stores,
            test_session_service,
            answer_service,
            assessment_service,
            notifier: Arc::new(TracingNotifier),
            jwt_secret: config.jwt_secret.clone(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn CourseProgressNotifier>) -> Self {
        self.notifier = notifier;
        self
    }
}

pub fn router(state: AppState) -> Router {
    let session_api = Router::new()
        .route(
            "/api/categories/:category_id/test-sessions",
            post(routes::test_sessions::start_test_session),
        )
        .route(
            "/api/test-sessions",
            get(routes::test_sessions::list_test_sessions),
        )
        .route(
            "/api/test-sessions/:id",
            get(routes::test_sessions::get_test_session),
        )
        .route(
            "/api/test-sessions/:id/answers",
            post(routes::test_sessions::save_test_answer),
        )
        .route(
            "/api/test-sessions/:id/submit",
            post(routes::test_sessions::submit_test_session),
        )
        .route(
            "/api/assessments/:kind/:target_id/sessions",
            post(routes::assessments::start_assessment_session),
        )
        .route(
            "/api/assessments/:kind/:target_id/sessions/:session_id/submit",
            post(routes::assessments::submit_assessment_session),
        )
        .route(
            "/api/assessment-sessions/:id",
            get(routes::assessments::get_assessment_session),
        )
        .route(
            "/api/assessment-sessions/:id/answers",
            post(routes::assessments::save_assessment_answer),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_bearer_auth,
        ));

    Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/openapi.json", get(routes::docs::openapi))
        .merge(session_api)
        .with_state(state)
}
