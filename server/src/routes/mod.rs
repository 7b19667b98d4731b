mod account;
mod app_router;
mod common;
mod gmail;
mod labels;
mod queue_worker;
mod user_settings;
mod webhook;

pub use app_router::AppRouter;
