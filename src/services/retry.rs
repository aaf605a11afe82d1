// src/services/retry.rs
//
// Retry selection: derives the wrong-question subset of a finished attempt
// and gates retry answers to exactly that subset.

use std::collections::HashSet;

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::AppError;
use crate::models::attempt::Attempt;
use crate::models::question::PublicQuestion;
use crate::models::training::RetryAnswer;
use crate::services::training::find_session;
use crate::services::{attempts, ensure_owner, scoring};

/// Questions the user answered incorrectly (including unanswered) in a
/// finished attempt, in public form: no correct key, no explanations.
pub async fn wrong_questions(
    pool: &SqlitePool,
    attempt_id: i64,
    user_id: i64,
) -> Result<Vec<PublicQuestion>, AppError> {
    let attempt = attempts::find_attempt(pool, attempt_id).await?;
    ensure_owner(attempt.user_id, user_id)?;
    ensure_finished(&attempt)?;

    let questions = attempts::load_exam_questions(pool, attempt.exam_base_id).await?;
    let selections = attempts::load_answer_map(pool, attempt_id).await?;
    let wrong: HashSet<i64> = scoring::grade(&questions, &selections)
        .wrong_question_ids()
        .into_iter()
        .collect();

    Ok(questions
        .into_iter()
        .filter(|q| wrong.contains(&q.question.id))
        .map(PublicQuestion::from)
        .collect())
}

/// Same as [`wrong_questions`], addressed through the training session that
/// wraps the attempt.
pub async fn wrong_questions_for_session(
    pool: &SqlitePool,
    session_id: i64,
    user_id: i64,
) -> Result<Vec<PublicQuestion>, AppError> {
    let session = find_session(pool, session_id).await?;
    ensure_owner(session.user_id, user_id)?;
    wrong_questions(pool, session.attempt_id, user_id).await
}

/// Records (or overwrites) a retry answer.
///
/// Only questions from the attempt's wrong-question set are accepted, and a
/// retry answer always carries a concrete choice: unlike the primary
/// attempt there is no clear-to-null.
pub async fn upsert_retry_answer(
    pool: &SqlitePool,
    session_id: i64,
    question_id: i64,
    selected_alternative_id: i64,
    user_id: i64,
) -> Result<RetryAnswer, AppError> {
    let session = find_session(pool, session_id).await?;
    ensure_owner(session.user_id, user_id)?;

    let attempt = attempts::find_attempt(pool, session.attempt_id).await?;
    ensure_finished(&attempt)?;

    let questions = attempts::load_exam_questions(pool, attempt.exam_base_id).await?;
    let selections = attempts::load_answer_map(pool, attempt.id).await?;
    let wrong: HashSet<i64> = scoring::grade(&questions, &selections)
        .wrong_question_ids()
        .into_iter()
        .collect();

    if !wrong.contains(&question_id) {
        return Err(AppError::InvalidState(
            "question was not answered incorrectly in the original attempt".to_string(),
        ));
    }

    attempts::ensure_alternative_of_question(pool, selected_alternative_id, question_id).await?;

    let answer = sqlx::query_as::<_, RetryAnswer>(
        "INSERT INTO retry_answers (training_session_id, question_id, selected_alternative_id, updated_at)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (training_session_id, question_id) DO UPDATE SET
             selected_alternative_id = excluded.selected_alternative_id,
             updated_at = excluded.updated_at
         RETURNING id, training_session_id, question_id, selected_alternative_id, updated_at",
    )
    .bind(session_id)
    .bind(question_id)
    .bind(selected_alternative_id)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(answer)
}

/// Number of retry answers whose selected alternative carries the
/// question's correct key. Feeds the FINAL score computation.
pub async fn retry_correct_count(pool: &SqlitePool, session_id: i64) -> Result<i64, AppError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*)
         FROM retry_answers ra
         JOIN questions q ON q.id = ra.question_id
         JOIN alternatives a ON a.id = ra.selected_alternative_id
         WHERE ra.training_session_id = $1
           AND q.correct_alternative_key IS NOT NULL
           AND a.key = q.correct_alternative_key",
    )
    .bind(session_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

fn ensure_finished(attempt: &Attempt) -> Result<(), AppError> {
    if attempt.finished_at.is_none() {
        return Err(AppError::InvalidState(
            "attempt is not finished".to_string(),
        ));
    }
    Ok(())
}
