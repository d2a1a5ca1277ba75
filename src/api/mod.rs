use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post, put},
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::services::jobs::JobQueue;

pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub jobs: JobQueue,
}

pub fn router(state: AppState, cors_allowed_origins: &str) -> Router {
    Router::new()
        .route("/", get(routes::health))
        .route("/users/{user_id}/profile", put(routes::update_profile))
        .route(
            "/users/{user_id}/workouts/generate",
            post(routes::generate_workout),
        )
        .route(
            "/users/{user_id}/workouts/regenerate",
            post(routes::regenerate_workout),
        )
        .route(
            "/users/{user_id}/plan-days/{plan_day_id}/regenerate",
            post(routes::regenerate_plan_day),
        )
        .route("/jobs/{job_id}", get(routes::job_status))
        .layer(setup_cors(cors_allowed_origins))
        .with_state(state)
}

/// `*` or an empty value allows any origin; otherwise a comma-separated list.
pub fn setup_cors(allowed_origins: &str) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty() && *origin != "*")
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    let allow_origin = if allowed_origins.trim() == "*" || origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
}
