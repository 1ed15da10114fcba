pub mod assessment_dto;
pub mod test_session_dto;
