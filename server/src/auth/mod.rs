pub mod google_token;
pub mod jwt;
