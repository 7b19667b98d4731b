use std::time::Duration;

use axum::{
    error_handling::HandleErrorLayer,
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, patch, post, put},
    BoxError, Router,
};
use tower::{timeout::TimeoutLayer, ServiceBuilder};
use tower_http::cors::{Any, CorsLayer};

use crate::{error::AppError, request_tracing::with_request_tracing, ServerState};

use super::{account, gmail, labels, queue_worker, user_settings, webhook};

#[cfg(debug_assertions)]
mod dev {
    use axum::{extract::Query, http::StatusCode, response::IntoResponse, Json};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    use crate::auth::jwt::generate_dev_token;

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct DevTokenParams {
        #[serde(default = "Uuid::new_v4")]
        pub user_id: Uuid,
        #[serde(default = "default_email")]
        pub email: String,
    }

    fn default_email() -> String {
        "test@example.com".to_string()
    }

    #[derive(Serialize)]
    struct DevTokenResponse {
        token: String,
    }

    pub async fn dev_token(Query(params): Query<DevTokenParams>) -> impl IntoResponse {
        match generate_dev_token(params.user_id, &params.email) {
            Ok(token) => (StatusCode::OK, Json(DevTokenResponse { token })).into_response(),
            Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create token").into_response(),
        }
    }
}

pub struct AppRouter;

impl AppRouter {
    pub fn create(state: ServerState, request_timeout: Duration) -> Router {
        let cors_layer = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

        let timed = Router::new()
            .route("/account/connect", post(account::connect))
            .nest(
                "/labels",
                Router::new()
                    .route("/", get(labels::list))
                    .route("/create", post(labels::create))
                    .route("/delete", delete(labels::delete))
                    .route("/toggle", patch(labels::toggle))
                    .route("/customize", put(labels::customize)),
            )
            .nest(
                "/user",
                Router::new()
                    .route(
                        "/draft-settings",
                        get(user_settings::get_draft_settings).post(user_settings::save_draft_settings),
                    )
                    .route(
                        "/settings",
                        get(user_settings::get_settings).put(user_settings::update_settings),
                    ),
            )
            .nest(
                "/gmail",
                Router::new()
                    .route(
                        "/register-watch",
                        post(gmail::register)
                            .get(gmail::watch_status)
                            .delete(gmail::stop),
                    )
                    .route(
                        "/generate-drafts-for-category",
                        post(gmail::generate_drafts_for_category),
                    )
                    .route("/create-draft", post(gmail::create_draft))
                    .route("/send", post(gmail::send))
                    .route("/labels", get(gmail::labels)),
            )
            .layer(
                ServiceBuilder::new()
                    .layer(HandleErrorLayer::new(handle_timeout_error))
                    .layer(TimeoutLayer::new(request_timeout)),
            );

        // Push deliveries and queue jobs always run to completion
        let untimed = Router::new()
            .route("/gmail-webhook", post(webhook::receive).get(webhook::status))
            .route("/queue/worker", post(queue_worker::handle));

        let router = Router::new()
            .route("/", get(|| async { "Flobase server" }))
            .nest("/api", timed.merge(untimed));

        #[cfg(debug_assertions)]
        let router = router.route("/dev/token", get(dev::dev_token));

        with_request_tracing(router.layer(cors_layer).fallback(handler_404))
        .with_state(state)
    }
}

async fn handle_timeout_error(err: BoxError) -> AppError {
    if err.is::<tower::timeout::error::Elapsed>() {
        AppError::RequestTimeout
    } else {
        AppError::Internal(anyhow::anyhow!("Unhandled error: {}", err))
    }
}

pub async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Route does not exist")
}
