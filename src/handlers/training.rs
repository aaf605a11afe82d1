// src/handlers/training.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::{
        attempt::UpsertRetryAnswerRequest,
        feedback::SetCompletedRequest,
        training::UpdateStageRequest,
    },
    services::{diagnosis, retry, training},
    state::AppState,
    utils::identity::Identity,
};

/// Returns the full current-state payload of a training session.
pub async fn get_session(
    State(pool): State<SqlitePool>,
    Extension(identity): Extension<Identity>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let view = training::get_one(&pool, session_id, identity.user_id).await?;
    Ok(Json(view))
}

/// Moves the session to the requested stage (forward-only) and returns the
/// resulting payload.
pub async fn update_stage(
    State(pool): State<SqlitePool>,
    Extension(identity): Extension<Identity>,
    Path(session_id): Path<i64>,
    Json(payload): Json<UpdateStageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let view = training::update_stage(&pool, session_id, identity.user_id, &payload.stage).await?;
    Ok(Json(view))
}

/// Lists the questions answered incorrectly in the primary attempt, in
/// public form (no correct keys, no explanations).
pub async fn retry_questions(
    State(pool): State<SqlitePool>,
    Extension(identity): Extension<Identity>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let questions = retry::wrong_questions_for_session(&pool, session_id, identity.user_id).await?;
    Ok(Json(questions))
}

/// Upserts a retry answer. Only questions from the wrong-question set are
/// accepted.
pub async fn upsert_retry_answer(
    State(pool): State<SqlitePool>,
    Extension(identity): Extension<Identity>,
    Path((session_id, question_id)): Path<(i64, i64)>,
    Json(payload): Json<UpsertRetryAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let answer = retry::upsert_retry_answer(
        &pool,
        session_id,
        question_id,
        payload.selected_alternative_id,
        identity.user_id,
    )
    .await?;
    Ok(Json(answer))
}

/// Generates per-subject diagnostic feedback for the session's attempt.
/// Idempotent: subjects that already have feedback are skipped.
pub async fn generate_diagnosis(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let feedbacks =
        diagnosis::generate_diagnosis(&state.pool, state.ai.as_ref(), session_id, identity.user_id)
            .await?;
    Ok(Json(feedbacks))
}

/// Generates (or returns the stored) study content of one study item.
pub async fn generate_study_content(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((session_id, study_item_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let view = diagnosis::generate_study_content(
        &state.pool,
        state.ai.as_ref(),
        session_id,
        study_item_id,
        identity.user_id,
    )
    .await?;
    Ok(Json(view))
}

/// Generates (or returns the stored) closing feedback of a FINAL session.
pub async fn generate_final_feedback(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = diagnosis::generate_final_feedback(
        &state.pool,
        state.ai.as_ref(),
        session_id,
        identity.user_id,
    )
    .await?;
    Ok(Json(session))
}

/// Toggles a study item's completion flag.
pub async fn set_study_item_completed(
    State(pool): State<SqlitePool>,
    Extension(identity): Extension<Identity>,
    Path((session_id, study_item_id)): Path<(i64, i64)>,
    Json(payload): Json<SetCompletedRequest>,
) -> Result<impl IntoResponse, AppError> {
    let item = diagnosis::set_study_item_completed(
        &pool,
        session_id,
        study_item_id,
        identity.user_id,
        payload.completed,
    )
    .await?;
    Ok(Json(item))
}
