// src/services/diagnosis.rs
//
// Generation commands: per-subject diagnostic feedback and study content,
// delegated to the AI collaborator. The prompt context is built here and
// deliberately carries no correct answer key.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use sqlx::SqlitePool;

use crate::ai::{
    ContentGenerator, FinalFeedbackInput, GeneratedExercise, PromptAlternative,
    StudyContentInput, SubjectDiagnosisInput, SubjectOutcome, WrongQuestionContext,
};
use crate::config::{EXERCISE_ALTERNATIVE_COUNT, GENERATED_EXERCISE_COUNT};
use crate::error::AppError;
use crate::models::feedback::{StudyItem, StudyItemView, SubjectFeedback};
use crate::models::question::QuestionWithAlternatives;
use crate::models::training::{TrainingSession, TrainingStage};
use crate::services::training::{find_session, study_item_view};
use crate::services::{attempts, ensure_owner, scoring};

/// Generates diagnostic feedback for every subject of the session's primary
/// attempt that does not have one yet.
///
/// One collaborator call per subject, all-or-nothing per call: a subject's
/// feedback row is only written after its call succeeded, and subjects that
/// already have a row are skipped entirely, so re-invocation is idempotent
/// and never duplicates feedback. A collaborator failure surfaces as
/// ExternalFailure; feedback already written in the same invocation stays.
pub async fn generate_diagnosis(
    pool: &SqlitePool,
    ai: &dyn ContentGenerator,
    session_id: i64,
    user_id: i64,
) -> Result<Vec<SubjectFeedback>, AppError> {
    let session = find_session(pool, session_id).await?;
    ensure_owner(session.user_id, user_id)?;

    let attempt = attempts::find_attempt(pool, session.attempt_id).await?;
    if attempt.finished_at.is_none() {
        return Err(AppError::InvalidState(
            "diagnosis requires a finished attempt".to_string(),
        ));
    }

    let questions = attempts::load_exam_questions(pool, attempt.exam_base_id).await?;
    let selections = attempts::load_answer_map(pool, attempt.id).await?;
    let report = scoring::grade(&questions, &selections);

    let existing: HashSet<String> =
        sqlx::query_scalar("SELECT subject FROM subject_feedbacks WHERE attempt_id = $1")
            .bind(attempt.id)
            .fetch_all(pool)
            .await?
            .into_iter()
            .collect();

    // BTreeMap keeps subject order deterministic across invocations.
    let mut by_subject: BTreeMap<String, Vec<&QuestionWithAlternatives>> = BTreeMap::new();
    for q in &questions {
        by_subject
            .entry(q.question.subject.clone())
            .or_default()
            .push(q);
    }

    for (subject, subject_questions) in by_subject {
        if existing.contains(&subject) {
            continue;
        }

        let correct_count = subject_questions
            .iter()
            .filter(|q| report.is_correct(q.question.id))
            .count();
        let wrong_questions: Vec<WrongQuestionContext> = subject_questions
            .iter()
            .filter(|q| !report.is_correct(q.question.id))
            .map(|q| wrong_question_context(q, &selections))
            .collect();

        let input = SubjectDiagnosisInput {
            subject: subject.clone(),
            total_questions: subject_questions.len(),
            correct_count,
            wrong_questions,
        };

        let diagnosis = ai.diagnose_subject(&input).await?;

        sqlx::query(
            "INSERT INTO subject_feedbacks (attempt_id, subject, evaluation, recommendations, created_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (attempt_id, subject) DO NOTHING",
        )
        .bind(attempt.id)
        .bind(&subject)
        .bind(&diagnosis.evaluation)
        .bind(&diagnosis.recommendations)
        .bind(Utc::now())
        .execute(pool)
        .await?;

        tracing::info!(
            "Generated diagnosis for subject '{}' of attempt {}",
            subject,
            attempt.id
        );
    }

    let feedbacks = sqlx::query_as::<_, SubjectFeedback>(
        "SELECT id, attempt_id, subject, evaluation, recommendations, created_at
         FROM subject_feedbacks WHERE attempt_id = $1
         ORDER BY subject",
    )
    .bind(attempt.id)
    .fetch_all(pool)
    .await?;

    Ok(feedbacks)
}

/// Generates the study content of one study item: an explanation plus up to
/// five exercises. Returns the stored content without calling the
/// collaborator when it was already generated.
pub async fn generate_study_content(
    pool: &SqlitePool,
    ai: &dyn ContentGenerator,
    session_id: i64,
    study_item_id: i64,
    user_id: i64,
) -> Result<StudyItemView, AppError> {
    let session = find_session(pool, session_id).await?;
    ensure_owner(session.user_id, user_id)?;

    let item = find_study_item(pool, session_id, study_item_id).await?;
    if item.explanation.is_some() {
        return study_item_view(pool, item).await;
    }

    let feedback = sqlx::query_as::<_, SubjectFeedback>(
        "SELECT id, attempt_id, subject, evaluation, recommendations, created_at
         FROM subject_feedbacks WHERE id = $1",
    )
    .bind(item.subject_feedback_id)
    .fetch_one(pool)
    .await?;

    let attempt = attempts::find_attempt(pool, session.attempt_id).await?;
    let questions = attempts::load_exam_questions(pool, attempt.exam_base_id).await?;
    let selections = attempts::load_answer_map(pool, attempt.id).await?;
    let report = scoring::grade(&questions, &selections);

    let wrong_questions: Vec<WrongQuestionContext> = questions
        .iter()
        .filter(|q| q.question.subject == feedback.subject && !report.is_correct(q.question.id))
        .map(|q| wrong_question_context(q, &selections))
        .collect();

    let input = StudyContentInput {
        subject: feedback.subject.clone(),
        recommendations: feedback.recommendations.clone(),
        wrong_questions,
    };

    let content = ai.generate_study_content(&input).await?;
    let exercises = accepted_exercises(&content.exercises);

    // Explanation and exercises land together or not at all.
    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE study_items SET explanation = $1 WHERE id = $2")
        .bind(&content.explanation)
        .bind(item.id)
        .execute(&mut *tx)
        .await?;

    for (position, exercise) in exercises.iter().enumerate() {
        let exercise_id: i64 = sqlx::query_scalar(
            "INSERT INTO exercises (study_item_id, statement, correct_key, position)
             VALUES ($1, $2, $3, $4)
             RETURNING id",
        )
        .bind(item.id)
        .bind(&exercise.statement)
        .bind(&exercise.correct_key)
        .bind(position as i64)
        .fetch_one(&mut *tx)
        .await?;

        for alternative in &exercise.alternatives {
            sqlx::query(
                "INSERT INTO exercise_alternatives (exercise_id, key, text) VALUES ($1, $2, $3)",
            )
            .bind(exercise_id)
            .bind(&alternative.key)
            .bind(&alternative.text)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;

    tracing::info!(
        "Generated study content for item {} ({} exercises)",
        item.id,
        exercises.len()
    );

    let item = find_study_item(pool, session_id, study_item_id).await?;
    study_item_view(pool, item).await
}

/// Generates the session's closing feedback once it has reached FINAL.
///
/// Set once: a session that already carries feedback is returned as-is,
/// without calling the collaborator. The prompt receives the score
/// evolution and the stored per-subject evaluations only.
pub async fn generate_final_feedback(
    pool: &SqlitePool,
    ai: &dyn ContentGenerator,
    session_id: i64,
    user_id: i64,
) -> Result<TrainingSession, AppError> {
    let session = find_session(pool, session_id).await?;
    ensure_owner(session.user_id, user_id)?;

    if session.final_feedback.is_some() {
        return Ok(session);
    }

    let final_percentage = match (session.current_stage, session.final_score_percentage) {
        (TrainingStage::Final, Some(percentage)) => percentage,
        _ => {
            return Err(AppError::InvalidState(
                "final feedback requires a session in the FINAL stage".to_string(),
            ));
        }
    };

    let attempt = attempts::find_attempt(pool, session.attempt_id).await?;
    let total_questions: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE exam_base_id = $1")
            .bind(attempt.exam_base_id)
            .fetch_one(pool)
            .await?;

    let initial_percentage = attempt.score_percentage.unwrap_or(0.0);
    let initial_correct = scoring::correct_from_percentage(initial_percentage, total_questions);
    let final_correct = scoring::correct_from_percentage(final_percentage, total_questions);

    let subjects: Vec<SubjectOutcome> = sqlx::query_as::<_, SubjectFeedback>(
        "SELECT id, attempt_id, subject, evaluation, recommendations, created_at
         FROM subject_feedbacks WHERE attempt_id = $1
         ORDER BY subject",
    )
    .bind(attempt.id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|f| SubjectOutcome {
        subject: f.subject,
        evaluation: f.evaluation,
    })
    .collect();

    let input = FinalFeedbackInput {
        initial_percentage,
        final_percentage,
        gain_points: final_correct - initial_correct,
        subjects,
    };

    let feedback = ai.generate_final_feedback(&input).await?;

    // COALESCE keeps the first stored text if a concurrent call won.
    sqlx::query(
        "UPDATE training_sessions SET final_feedback = COALESCE(final_feedback, $1) WHERE id = $2",
    )
    .bind(&feedback)
    .bind(session.id)
    .execute(pool)
    .await?;

    find_session(pool, session_id).await
}

/// Toggles a study item's completion timestamp.
pub async fn set_study_item_completed(
    pool: &SqlitePool,
    session_id: i64,
    study_item_id: i64,
    user_id: i64,
    completed: bool,
) -> Result<StudyItem, AppError> {
    let session = find_session(pool, session_id).await?;
    ensure_owner(session.user_id, user_id)?;

    // Existence check under the session scope first: a foreign item id is
    // a NotFound, not a silent no-op.
    find_study_item(pool, session_id, study_item_id).await?;

    let completed_at = if completed { Some(Utc::now()) } else { None };
    let item = sqlx::query_as::<_, StudyItem>(
        "UPDATE study_items SET completed_at = $1
         WHERE id = $2 AND training_session_id = $3
         RETURNING id, training_session_id, subject_feedback_id, explanation, completed_at",
    )
    .bind(completed_at)
    .bind(study_item_id)
    .bind(session_id)
    .fetch_one(pool)
    .await?;

    Ok(item)
}

async fn find_study_item(
    pool: &SqlitePool,
    session_id: i64,
    study_item_id: i64,
) -> Result<StudyItem, AppError> {
    sqlx::query_as::<_, StudyItem>(
        "SELECT id, training_session_id, subject_feedback_id, explanation, completed_at
         FROM study_items WHERE id = $1 AND training_session_id = $2",
    )
    .bind(study_item_id)
    .bind(session_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("study item not found".to_string()))
}

/// Builds the prompt context of one wrong question. The context carries the
/// statement, the alternative texts and the key the user picked; the
/// question's correct key never enters it.
fn wrong_question_context(
    question: &QuestionWithAlternatives,
    selections: &HashMap<i64, Option<i64>>,
) -> WrongQuestionContext {
    let selected_id = selections
        .get(&question.question.id)
        .copied()
        .flatten();
    let selected_key = selected_id.and_then(|id| {
        question
            .alternatives
            .iter()
            .find(|a| a.id == id)
            .map(|a| a.key.clone())
    });

    WrongQuestionContext {
        statement: question.question.statement.clone(),
        alternatives: question
            .alternatives
            .iter()
            .map(|a| PromptAlternative {
                key: a.key.clone(),
                text: a.text.clone(),
            })
            .collect(),
        selected_key,
    }
}

/// Keeps the structurally valid exercises, at most five: four alternatives
/// with distinct keys, the correct key among them, non-empty statement.
fn accepted_exercises(exercises: &[GeneratedExercise]) -> Vec<&GeneratedExercise> {
    exercises
        .iter()
        .filter(|e| exercise_is_usable(e))
        .take(GENERATED_EXERCISE_COUNT)
        .collect()
}

fn exercise_is_usable(exercise: &GeneratedExercise) -> bool {
    if exercise.statement.trim().is_empty() {
        return false;
    }
    if exercise.alternatives.len() != EXERCISE_ALTERNATIVE_COUNT {
        return false;
    }
    let keys: HashSet<&str> = exercise
        .alternatives
        .iter()
        .map(|a| a.key.as_str())
        .collect();
    keys.len() == EXERCISE_ALTERNATIVE_COUNT && keys.contains(exercise.correct_key.as_str())
}
