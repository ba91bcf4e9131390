#![allow(dead_code)]

use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod srs;
pub mod utils;

pub use config::Config;
pub use services::AppState;

/// CSP middleware adds Content-Security-Policy header to all responses
async fn csp_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'self'; connect-src 'self'"),
    );
    response
}

pub fn create_router(app_state: std::sync::Arc<services::AppState>) -> Router {
    // CORS configuration for the read-side progress endpoints
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any); // TODO: restrict to specific origins in production

    Router::new()
        // Public endpoints (no auth required)
        .route("/health", get(handlers::health_check))
        // Metrics endpoint with Basic Auth protection
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest("/api/v1/content", content_routes())
        .nest("/api/v1/courses", course_routes())
        .nest("/api/v1/lessons", lesson_routes())
        .nest("/api/v1/placement", placement_routes())
        .nest("/api/v1/sessions", sessions_routes())
        .nest("/api/v1/users", user_routes().layer(cors))
        .with_state(app_state)
        .layer(middleware::from_fn(csp_middleware))
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn sessions_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route("/", post(handlers::sessions::create_session))
        .route("/{id}", get(handlers::sessions::get_session))
        .route("/{id}/question", get(handlers::sessions::next_question))
        .route("/{id}/answers", post(handlers::sessions::submit_answer))
        .route("/{id}/complete", post(handlers::sessions::complete_session))
}

fn content_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route("/", post(handlers::content::create_content_source))
        .route("/{id}", get(handlers::content::get_content_source))
        .route("/{id}/process", post(handlers::content::process_content_source))
}

fn course_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route("/", get(handlers::content::list_courses))
        .route("/{id}", get(handlers::content::get_course))
        .route("/{id}/lessons", get(handlers::content::list_course_lessons))
}

fn lesson_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new().route(
        "/{id}/questions",
        get(handlers::questions::get_question_bank).post(handlers::questions::generate_questions),
    )
}

fn placement_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route(
            "/tests",
            get(handlers::placement::list_placement_tests)
                .post(handlers::placement::create_placement_test),
        )
        .route("/submit", post(handlers::placement::submit_placement))
        .route(
            "/results/{user_id}",
            get(handlers::placement::latest_placement_result),
        )
}

fn user_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route("/{id}/progress", get(handlers::progress::get_user_progress))
        .route("/{id}/reviews", get(handlers::progress::due_reviews))
        .route(
            "/{user_id}/courses/{course_id}/analysis",
            post(handlers::progress::analyze_progress),
        )
        .route(
            "/{user_id}/courses/{course_id}/learning-path",
            get(handlers::progress::get_learning_path)
                .post(handlers::progress::generate_learning_path),
        )
}
