// src/handlers/catalog.rs

use std::collections::HashSet;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        exam_base::{CreateExamBaseRequest, ExamBase},
        question::{Alternative, CreateQuestionRequest, PublicQuestion, Question},
    },
    services::attempts,
    utils::html::clean_html,
};

/// Creates a new exam base.
pub async fn create_exam_base(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateExamBaseRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let base = sqlx::query_as::<_, ExamBase>(
        "INSERT INTO exam_bases (title, description, created_at)
         VALUES ($1, $2, $3)
         RETURNING id, title, description, created_at",
    )
    .bind(clean_html(&payload.title))
    .bind(payload.description.as_deref().map(clean_html))
    .bind(Utc::now())
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(base)))
}

/// Lists all exam bases.
pub async fn list_exam_bases(
    State(pool): State<SqlitePool>,
) -> Result<impl IntoResponse, AppError> {
    let bases = sqlx::query_as::<_, ExamBase>(
        "SELECT id, title, description, created_at FROM exam_bases ORDER BY id",
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(bases))
}

/// Lists an exam base's questions in public form (no correct keys, no
/// alternative explanations).
pub async fn list_questions(
    State(pool): State<SqlitePool>,
    Path(exam_base_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    ensure_exam_base_exists(&pool, exam_base_id).await?;

    let questions: Vec<PublicQuestion> = attempts::load_exam_questions(&pool, exam_base_id)
        .await?
        .into_iter()
        .map(PublicQuestion::from)
        .collect();

    Ok(Json(questions))
}

/// Creates a question together with its alternatives.
///
/// Beyond DTO validation: alternative keys must be unique within the
/// question, and a supplied correct key must match one of them.
pub async fn create_question(
    State(pool): State<SqlitePool>,
    Path(exam_base_id): Path<i64>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let mut keys = HashSet::new();
    for alternative in &payload.alternatives {
        if !keys.insert(alternative.key.as_str()) {
            return Err(AppError::BadRequest(format!(
                "duplicate alternative key: {}",
                alternative.key
            )));
        }
    }

    if let Some(correct_key) = &payload.correct_alternative_key {
        if !keys.contains(correct_key.as_str()) {
            return Err(AppError::BadRequest(format!(
                "correct alternative key {} does not match any alternative",
                correct_key
            )));
        }
    }

    ensure_exam_base_exists(&pool, exam_base_id).await?;

    let position: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE exam_base_id = $1")
            .bind(exam_base_id)
            .fetch_one(&pool)
            .await?;

    let mut tx = pool.begin().await?;

    let question = sqlx::query_as::<_, Question>(
        "INSERT INTO questions (exam_base_id, subject, statement, correct_alternative_key, position, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING id, exam_base_id, subject, statement, correct_alternative_key, position, created_at",
    )
    .bind(exam_base_id)
    .bind(clean_html(&payload.subject))
    .bind(clean_html(&payload.statement))
    .bind(&payload.correct_alternative_key)
    .bind(position)
    .bind(Utc::now())
    .fetch_one(&mut *tx)
    .await?;

    let mut alternatives = Vec::with_capacity(payload.alternatives.len());
    for alternative in &payload.alternatives {
        let row = sqlx::query_as::<_, Alternative>(
            "INSERT INTO alternatives (question_id, key, text, explanation)
             VALUES ($1, $2, $3, $4)
             RETURNING id, question_id, key, text, explanation",
        )
        .bind(question.id)
        .bind(&alternative.key)
        .bind(clean_html(&alternative.text))
        .bind(alternative.explanation.as_deref().map(clean_html))
        .fetch_one(&mut *tx)
        .await?;
        alternatives.push(row);
    }

    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "question": question,
            "alternatives": alternatives,
        })),
    ))
}

async fn ensure_exam_base_exists(pool: &SqlitePool, exam_base_id: i64) -> Result<(), AppError> {
    sqlx::query("SELECT id FROM exam_bases WHERE id = $1")
        .bind(exam_base_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("exam base not found".to_string()))?;
    Ok(())
}
