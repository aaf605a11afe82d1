// src/services/training.rs
//
// The training state machine: owns the EXAM -> DIAGNOSIS -> STUDY -> RETRY
// -> FINAL progression, its forward-only invariant, and the side effects
// that run on stage entry.

use sqlx::SqlitePool;

use crate::error::AppError;
use crate::models::feedback::{
    Exercise, ExerciseAlternative, ExerciseAlternativeView, ExerciseView, StudyItem,
    StudyItemView, SubjectFeedback,
};
use crate::models::training::{
    AttemptSummary, FinalComparison, TrainingSession, TrainingSessionView, TrainingStage,
};
use crate::services::{attempts, ensure_owner, retry, scoring};

pub async fn find_session(
    pool: &SqlitePool,
    session_id: i64,
) -> Result<TrainingSession, AppError> {
    sqlx::query_as::<_, TrainingSession>(
        "SELECT id, attempt_id, user_id, current_stage, final_score_percentage, final_feedback, created_at
         FROM training_sessions WHERE id = $1",
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("training session not found".to_string()))
}

/// Moves a session to the requested stage.
///
/// The transition is forward-only over the explicit order table; re-setting
/// the current stage is an idempotent no-op and forward jumps may skip
/// intermediate stages. Entering STUDY materializes study items, entering
/// FINAL computes the final score once. Stage and score persist in a single
/// update, and the returned payload reflects the transition (read after
/// write).
pub async fn update_stage(
    pool: &SqlitePool,
    session_id: i64,
    user_id: i64,
    requested_stage: &str,
) -> Result<TrainingSessionView, AppError> {
    let requested = TrainingStage::parse(requested_stage)
        .ok_or_else(|| AppError::BadRequest(format!("unknown stage: {requested_stage}")))?;

    let session = find_session(pool, session_id).await?;
    ensure_owner(session.user_id, user_id)?;

    if requested.index_in_flow() < session.current_stage.index_in_flow() {
        return Err(AppError::BadRequest(format!(
            "cannot go back from {} to {}",
            session.current_stage.as_str(),
            requested.as_str()
        )));
    }

    if requested == TrainingStage::Study {
        materialize_study_items(pool, &session).await?;
    }

    if requested == TrainingStage::Final && session.final_score_percentage.is_none() {
        let final_percentage = compute_final_score(pool, &session).await?;
        // COALESCE keeps the first computed value if a concurrent call
        // already stored one: FINAL is memoized, never recomputed.
        sqlx::query(
            "UPDATE training_sessions
             SET current_stage = $1,
                 final_score_percentage = COALESCE(final_score_percentage, $2)
             WHERE id = $3",
        )
        .bind(requested)
        .bind(final_percentage)
        .bind(session_id)
        .execute(pool)
        .await?;
    } else {
        sqlx::query("UPDATE training_sessions SET current_stage = $1 WHERE id = $2")
            .bind(requested)
            .bind(session_id)
            .execute(pool)
            .await?;
    }

    tracing::info!(
        "Training session {} moved to stage {}",
        session_id,
        requested.as_str()
    );

    get_one(pool, session_id, user_id).await
}

/// One study item per subject feedback of the primary attempt, upserted by
/// the natural key so repeated entry into STUDY never duplicates items.
async fn materialize_study_items(
    pool: &SqlitePool,
    session: &TrainingSession,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO study_items (training_session_id, subject_feedback_id)
         SELECT $1, id FROM subject_feedbacks WHERE attempt_id = $2
         ON CONFLICT (training_session_id, subject_feedback_id) DO NOTHING",
    )
    .bind(session.id)
    .bind(session.attempt_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Final score: initially-correct answers (recovered from the percentage
/// recorded at finish time) plus correct retry answers, over the base's
/// full question count. An attempt that was never finished contributes 0.
async fn compute_final_score(
    pool: &SqlitePool,
    session: &TrainingSession,
) -> Result<f64, AppError> {
    let attempt = attempts::find_attempt(pool, session.attempt_id).await?;
    let total_questions = count_questions(pool, attempt.exam_base_id).await?;

    let initial_correct =
        scoring::correct_from_percentage(attempt.score_percentage.unwrap_or(0.0), total_questions);
    let retry_correct = retry::retry_correct_count(pool, session.id).await?;
    let final_correct = initial_correct + retry_correct;

    if total_questions == 0 {
        return Ok(0.0);
    }
    Ok(final_correct as f64 / total_questions as f64 * 100.0)
}

/// Full session payload.
///
/// Feedback is returned whenever the primary attempt is finished, whatever
/// the current stage: the stage gates UI navigation, not data availability.
pub async fn get_one(
    pool: &SqlitePool,
    session_id: i64,
    user_id: i64,
) -> Result<TrainingSessionView, AppError> {
    let session = find_session(pool, session_id).await?;
    ensure_owner(session.user_id, user_id)?;

    let attempt = attempts::find_attempt(pool, session.attempt_id).await?;
    let total_questions = count_questions(pool, attempt.exam_base_id).await?;
    let answered_questions: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM answers
         WHERE attempt_id = $1 AND selected_alternative_id IS NOT NULL",
    )
    .bind(attempt.id)
    .fetch_one(pool)
    .await?;

    let feedbacks = if attempt.finished_at.is_some() {
        sqlx::query_as::<_, SubjectFeedback>(
            "SELECT id, attempt_id, subject, evaluation, recommendations, created_at
             FROM subject_feedbacks WHERE attempt_id = $1
             ORDER BY subject",
        )
        .bind(attempt.id)
        .fetch_all(pool)
        .await?
    } else {
        Vec::new()
    };

    let study_items = load_study_item_views(pool, session.id).await?;

    let final_comparison = match (session.current_stage, session.final_score_percentage) {
        (TrainingStage::Final, Some(final_percentage)) => {
            let initial_percentage = attempt.score_percentage.unwrap_or(0.0);
            let initial_correct =
                scoring::correct_from_percentage(initial_percentage, total_questions);
            let final_correct = scoring::correct_from_percentage(final_percentage, total_questions);
            Some(FinalComparison {
                initial_percentage,
                final_percentage,
                initial_correct,
                final_correct,
                gain_points: final_correct - initial_correct,
                gain_percent: (final_percentage - initial_percentage).round() as i64,
            })
        }
        _ => None,
    };

    Ok(TrainingSessionView {
        id: session.id,
        current_stage: session.current_stage,
        final_score_percentage: session.final_score_percentage,
        final_feedback: session.final_feedback,
        attempt: AttemptSummary::from_attempt(&attempt, total_questions, answered_questions),
        feedbacks,
        study_items,
        final_comparison,
    })
}

/// Loads a session's study items joined with their subject feedback and
/// generated exercises.
pub async fn load_study_item_views(
    pool: &SqlitePool,
    session_id: i64,
) -> Result<Vec<StudyItemView>, AppError> {
    let items = sqlx::query_as::<_, StudyItem>(
        "SELECT id, training_session_id, subject_feedback_id, explanation, completed_at
         FROM study_items WHERE training_session_id = $1
         ORDER BY id",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    let mut views = Vec::with_capacity(items.len());
    for item in items {
        views.push(study_item_view(pool, item).await?);
    }
    Ok(views)
}

pub async fn study_item_view(
    pool: &SqlitePool,
    item: StudyItem,
) -> Result<StudyItemView, AppError> {
    let feedback = sqlx::query_as::<_, SubjectFeedback>(
        "SELECT id, attempt_id, subject, evaluation, recommendations, created_at
         FROM subject_feedbacks WHERE id = $1",
    )
    .bind(item.subject_feedback_id)
    .fetch_one(pool)
    .await?;

    let exercises = sqlx::query_as::<_, Exercise>(
        "SELECT id, study_item_id, statement, correct_key, position
         FROM exercises WHERE study_item_id = $1
         ORDER BY position, id",
    )
    .bind(item.id)
    .fetch_all(pool)
    .await?;

    let mut exercise_views = Vec::with_capacity(exercises.len());
    for exercise in exercises {
        let alternatives = sqlx::query_as::<_, ExerciseAlternative>(
            "SELECT id, exercise_id, key, text FROM exercise_alternatives
             WHERE exercise_id = $1 ORDER BY key",
        )
        .bind(exercise.id)
        .fetch_all(pool)
        .await?;

        exercise_views.push(ExerciseView {
            id: exercise.id,
            statement: exercise.statement,
            correct_key: exercise.correct_key,
            alternatives: alternatives
                .into_iter()
                .map(|a| ExerciseAlternativeView {
                    id: a.id,
                    key: a.key,
                    text: a.text,
                })
                .collect(),
        });
    }

    Ok(StudyItemView {
        id: item.id,
        subject_feedback_id: item.subject_feedback_id,
        subject: feedback.subject,
        evaluation: feedback.evaluation,
        recommendations: feedback.recommendations,
        explanation: item.explanation,
        completed_at: item.completed_at,
        exercises: exercise_views,
    })
}

async fn count_questions(pool: &SqlitePool, exam_base_id: i64) -> Result<i64, AppError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE exam_base_id = $1")
        .bind(exam_base_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}
