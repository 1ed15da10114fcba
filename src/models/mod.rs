pub mod answer;
pub mod assessment_session;
pub mod blueprint;
pub mod question;
pub mod target;
pub mod test_session;
