// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{attempt, catalog, training},
    state::AppState,
    utils::identity::identity_middleware,
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (catalog, attempts, training sessions).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (Database Pool, AI client).
pub fn create_router(state: AppState) -> Router {
    let origins: [HeaderValue; 2] = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let exam_base_routes = Router::new()
        .route(
            "/",
            get(catalog::list_exam_bases).post(catalog::create_exam_base),
        )
        .route(
            "/{id}/questions",
            get(catalog::list_questions).post(catalog::create_question),
        )
        // Attempt routes are user-scoped and require an identity.
        .merge(
            Router::new()
                .route("/{id}/attempts", post(attempt::start_attempt))
                .route("/{id}/attempts/{attempt_id}", get(attempt::get_attempt))
                .route(
                    "/{id}/attempts/{attempt_id}/finish",
                    post(attempt::finish_attempt),
                )
                .route(
                    "/{id}/attempts/{attempt_id}/answers/{question_id}",
                    put(attempt::upsert_answer),
                )
                .layer(middleware::from_fn(identity_middleware)),
        );

    let training_routes = Router::new()
        .route("/{id}", get(training::get_session))
        .route("/{id}/stage", put(training::update_stage))
        .route("/{id}/retry/questions", get(training::retry_questions))
        .route(
            "/{id}/retry/answers/{question_id}",
            put(training::upsert_retry_answer),
        )
        .route("/{id}/diagnosis", post(training::generate_diagnosis))
        .route(
            "/{id}/final-feedback",
            post(training::generate_final_feedback),
        )
        .route(
            "/{id}/study-items/{item_id}/content",
            post(training::generate_study_content),
        )
        .route(
            "/{id}/study-items/{item_id}/completed",
            put(training::set_study_item_completed),
        )
        .layer(middleware::from_fn(identity_middleware));

    Router::new()
        .nest("/api/exam-bases", exam_base_routes)
        .nest("/api/training-sessions", training_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
