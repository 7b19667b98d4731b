pub use entity::{processed_job, profile, user_settings};
pub use sea_orm::{
    entity::prelude::*,
    sea_query::{Expr, OnConflict},
    ActiveValue, DatabaseConnection, DbErr, SqlErr,
};
