pub mod client;
pub mod connector;
pub mod message_detail;
pub mod mime;
pub mod provider;
