pub mod prelude;

pub mod processed_job;
pub mod profile;
pub mod user_settings;
