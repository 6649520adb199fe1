pub mod credential;
pub mod credential_format;
pub mod input_descriptor;
pub mod matcher;
pub mod presentation_definition;
pub mod presentation_submission;
pub mod requirement;
pub mod schema_resolution;
