pub mod api_quota;
pub mod label_colors;
pub mod types;

/// System label every watched notification is filtered on
pub const INBOX_LABEL: &str = "INBOX";
