pub mod answer_service;
pub mod assessment_service;
pub mod blueprint_service;
pub mod grading_service;
pub mod notifier;
pub mod target_service;
pub mod test_session_service;
