pub use super::processed_job::Entity as ProcessedJob;
pub use super::profile::Entity as Profile;
pub use super::user_settings::Entity as UserSettings;
