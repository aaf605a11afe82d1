// src/handlers/attempt.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::attempt::UpsertAnswerRequest,
    services::attempts,
    utils::identity::Identity,
};

/// Starts an attempt on an exam base. The training session wrapping it is
/// created in the same transaction and returned alongside.
pub async fn start_attempt(
    State(pool): State<SqlitePool>,
    Extension(identity): Extension<Identity>,
    Path(exam_base_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let started = attempts::start(&pool, exam_base_id, identity.user_id).await?;
    Ok((StatusCode::CREATED, Json(started)))
}

/// Returns an attempt with its questions (public form) and the answers
/// recorded so far.
pub async fn get_attempt(
    State(pool): State<SqlitePool>,
    Extension(identity): Extension<Identity>,
    Path((exam_base_id, attempt_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let detail = attempts::get(&pool, exam_base_id, attempt_id, identity.user_id).await?;
    Ok(Json(detail))
}

/// Upserts the answer of one question. Sending null (or an empty string)
/// clears the selection.
pub async fn upsert_answer(
    State(pool): State<SqlitePool>,
    Extension(identity): Extension<Identity>,
    Path((exam_base_id, attempt_id, question_id)): Path<(i64, i64, i64)>,
    Json(payload): Json<UpsertAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let answer = attempts::upsert_answer(
        &pool,
        exam_base_id,
        attempt_id,
        question_id,
        payload.selected_alternative_id,
        identity.user_id,
    )
    .await?;
    Ok(Json(answer))
}

/// Finishes an attempt. One-way: the attempt's answers become immutable
/// for scoring.
pub async fn finish_attempt(
    State(pool): State<SqlitePool>,
    Extension(identity): Extension<Identity>,
    Path((exam_base_id, attempt_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = attempts::finish(&pool, exam_base_id, attempt_id, identity.user_id).await?;
    Ok(Json(attempt))
}
