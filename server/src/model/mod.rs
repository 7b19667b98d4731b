pub mod account;
pub mod category;
pub mod processed_job;
pub mod profile;
pub mod settings;
pub mod store;
pub mod user_settings;
