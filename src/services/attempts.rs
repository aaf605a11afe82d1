// src/services/attempts.rs
//
// Attempt lifecycle: start, answer, finish. An attempt is immutable for
// scoring once finished; later answer upserts are rejected.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::AppError;
use crate::models::attempt::{Answer, Attempt, AttemptDetail};
use crate::models::question::{Alternative, PublicQuestion, Question, QuestionWithAlternatives};
use crate::models::training::{StartedTraining, TrainingSession, TrainingStage};
use crate::services::{ensure_owner, scoring};

/// Loads an exam base's questions joined with their alternatives, in
/// position order. Shared by scoring, retry selection and the public views.
pub async fn load_exam_questions(
    pool: &SqlitePool,
    exam_base_id: i64,
) -> Result<Vec<QuestionWithAlternatives>, AppError> {
    let questions = sqlx::query_as::<_, Question>(
        "SELECT id, exam_base_id, subject, statement, correct_alternative_key, position, created_at
         FROM questions WHERE exam_base_id = $1
         ORDER BY position, id",
    )
    .bind(exam_base_id)
    .fetch_all(pool)
    .await?;

    let alternatives = sqlx::query_as::<_, Alternative>(
        "SELECT a.id, a.question_id, a.key, a.text, a.explanation
         FROM alternatives a
         JOIN questions q ON a.question_id = q.id
         WHERE q.exam_base_id = $1
         ORDER BY a.question_id, a.key",
    )
    .bind(exam_base_id)
    .fetch_all(pool)
    .await?;

    let mut by_question: HashMap<i64, Vec<Alternative>> = HashMap::new();
    for alternative in alternatives {
        by_question
            .entry(alternative.question_id)
            .or_default()
            .push(alternative);
    }

    Ok(questions
        .into_iter()
        .map(|question| {
            let alternatives = by_question.remove(&question.id).unwrap_or_default();
            QuestionWithAlternatives {
                question,
                alternatives,
            }
        })
        .collect())
}

/// Loads the recorded selections of an attempt as `question_id -> selection`.
pub async fn load_answer_map(
    pool: &SqlitePool,
    attempt_id: i64,
) -> Result<HashMap<i64, Option<i64>>, AppError> {
    let rows: Vec<(i64, Option<i64>)> = sqlx::query_as(
        "SELECT question_id, selected_alternative_id FROM answers WHERE attempt_id = $1",
    )
    .bind(attempt_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().collect())
}

/// Finds an attempt inside the exam base referenced by the request path.
/// A cross-scope reference is a NotFound, so other users' resources are
/// never confirmed to exist.
pub async fn find_attempt_in_base(
    pool: &SqlitePool,
    exam_base_id: i64,
    attempt_id: i64,
) -> Result<Attempt, AppError> {
    sqlx::query_as::<_, Attempt>(
        "SELECT id, exam_base_id, user_id, started_at, finished_at, score_percentage
         FROM attempts WHERE id = $1 AND exam_base_id = $2",
    )
    .bind(attempt_id)
    .bind(exam_base_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("attempt not found".to_string()))
}

pub async fn find_attempt(pool: &SqlitePool, attempt_id: i64) -> Result<Attempt, AppError> {
    sqlx::query_as::<_, Attempt>(
        "SELECT id, exam_base_id, user_id, started_at, finished_at, score_percentage
         FROM attempts WHERE id = $1",
    )
    .bind(attempt_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("attempt not found".to_string()))
}

/// Starts an attempt and its training session together, in one transaction.
pub async fn start(
    pool: &SqlitePool,
    exam_base_id: i64,
    user_id: i64,
) -> Result<StartedTraining, AppError> {
    let base_exists = sqlx::query("SELECT id FROM exam_bases WHERE id = $1")
        .bind(exam_base_id)
        .fetch_optional(pool)
        .await?;
    if base_exists.is_none() {
        return Err(AppError::NotFound("exam base not found".to_string()));
    }

    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let attempt = sqlx::query_as::<_, Attempt>(
        "INSERT INTO attempts (exam_base_id, user_id, started_at)
         VALUES ($1, $2, $3)
         RETURNING id, exam_base_id, user_id, started_at, finished_at, score_percentage",
    )
    .bind(exam_base_id)
    .bind(user_id)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    let session = sqlx::query_as::<_, TrainingSession>(
        "INSERT INTO training_sessions (attempt_id, user_id, current_stage, created_at)
         VALUES ($1, $2, $3, $4)
         RETURNING id, attempt_id, user_id, current_stage, final_score_percentage, final_feedback, created_at",
    )
    .bind(attempt.id)
    .bind(user_id)
    .bind(TrainingStage::Exam)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        "User {} started attempt {} on exam base {}",
        user_id,
        attempt.id,
        exam_base_id
    );

    Ok(StartedTraining { attempt, session })
}

/// Attempt with its questions (public form) and the answers so far.
pub async fn get(
    pool: &SqlitePool,
    exam_base_id: i64,
    attempt_id: i64,
    user_id: i64,
) -> Result<AttemptDetail, AppError> {
    let attempt = find_attempt_in_base(pool, exam_base_id, attempt_id).await?;
    ensure_owner(attempt.user_id, user_id)?;

    let questions = load_exam_questions(pool, exam_base_id)
        .await?
        .into_iter()
        .map(PublicQuestion::from)
        .collect();

    let answers = sqlx::query_as::<_, Answer>(
        "SELECT id, attempt_id, question_id, selected_alternative_id, updated_at
         FROM answers WHERE attempt_id = $1
         ORDER BY question_id",
    )
    .bind(attempt_id)
    .fetch_all(pool)
    .await?;

    Ok(AttemptDetail {
        attempt,
        questions,
        answers,
    })
}

/// Records (or overwrites) the answer of one question in an attempt.
///
/// The write is an upsert keyed by (attempt_id, question_id): last writer
/// wins, no history of prior selections is kept, and `None` clears the
/// answer ("click again to deselect").
pub async fn upsert_answer(
    pool: &SqlitePool,
    exam_base_id: i64,
    attempt_id: i64,
    question_id: i64,
    selected_alternative_id: Option<i64>,
    user_id: i64,
) -> Result<Answer, AppError> {
    let attempt = find_attempt_in_base(pool, exam_base_id, attempt_id).await?;
    ensure_owner(attempt.user_id, user_id)?;

    if attempt.finished_at.is_some() {
        return Err(AppError::InvalidState(
            "attempt is already finished".to_string(),
        ));
    }

    let question = sqlx::query_as::<_, Question>(
        "SELECT id, exam_base_id, subject, statement, correct_alternative_key, position, created_at
         FROM questions WHERE id = $1 AND exam_base_id = $2",
    )
    .bind(question_id)
    .bind(attempt.exam_base_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("question not found".to_string()))?;

    if let Some(alternative_id) = selected_alternative_id {
        ensure_alternative_of_question(pool, alternative_id, question.id).await?;
    }

    let answer = sqlx::query_as::<_, Answer>(
        "INSERT INTO answers (attempt_id, question_id, selected_alternative_id, updated_at)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (attempt_id, question_id) DO UPDATE SET
             selected_alternative_id = excluded.selected_alternative_id,
             updated_at = excluded.updated_at
         RETURNING id, attempt_id, question_id, selected_alternative_id, updated_at",
    )
    .bind(attempt_id)
    .bind(question_id)
    .bind(selected_alternative_id)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(answer)
}

/// Finishes an attempt: sets `finished_at` and records the score computed
/// by the scoring engine, in one guarded update. One-way transition.
pub async fn finish(
    pool: &SqlitePool,
    exam_base_id: i64,
    attempt_id: i64,
    user_id: i64,
) -> Result<Attempt, AppError> {
    let attempt = find_attempt_in_base(pool, exam_base_id, attempt_id).await?;
    ensure_owner(attempt.user_id, user_id)?;

    if attempt.finished_at.is_some() {
        return Err(AppError::InvalidState(
            "attempt is already finished".to_string(),
        ));
    }

    let questions = load_exam_questions(pool, attempt.exam_base_id).await?;
    let selections = load_answer_map(pool, attempt_id).await?;
    let report = scoring::grade(&questions, &selections);

    // The IS NULL guard makes concurrent finishes race-safe: exactly one
    // caller observes the update.
    let finished = sqlx::query_as::<_, Attempt>(
        "UPDATE attempts SET finished_at = $1, score_percentage = $2
         WHERE id = $3 AND finished_at IS NULL
         RETURNING id, exam_base_id, user_id, started_at, finished_at, score_percentage",
    )
    .bind(Utc::now())
    .bind(report.percentage)
    .bind(attempt_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::InvalidState("attempt is already finished".to_string()))?;

    tracing::info!(
        "Attempt {} finished: {}/{} correct ({}%)",
        attempt_id,
        report.correct_count,
        report.total_questions,
        report.percentage
    );

    Ok(finished)
}

/// Verifies an alternative exists and belongs to the given question.
pub async fn ensure_alternative_of_question(
    pool: &SqlitePool,
    alternative_id: i64,
    question_id: i64,
) -> Result<(), AppError> {
    let alternative = sqlx::query_as::<_, Alternative>(
        "SELECT id, question_id, key, text, explanation FROM alternatives WHERE id = $1",
    )
    .bind(alternative_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("alternative not found".to_string()))?;

    if alternative.question_id != question_id {
        return Err(AppError::BadRequest(
            "alternative does not belong to the question".to_string(),
        ));
    }
    Ok(())
}
