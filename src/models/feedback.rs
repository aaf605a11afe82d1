// src/models/feedback.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

/// Represents the 'subject_feedbacks' table: externally (AI) generated
/// evaluation + recommendations for one exam subject, keyed to an attempt.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SubjectFeedback {
    pub id: i64,
    pub attempt_id: i64,
    pub subject: String,
    pub evaluation: String,
    pub recommendations: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Represents the 'study_items' table: one per (session, subject feedback),
/// materialized lazily the first time the session reaches STUDY.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StudyItem {
    pub id: i64,
    pub training_session_id: i64,
    pub subject_feedback_id: i64,
    pub explanation: Option<String>,

    /// User-toggled.
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Represents the 'exercises' table: generated practice exercises attached
/// to a study item.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Exercise {
    pub id: i64,
    pub study_item_id: i64,
    pub statement: String,
    pub correct_key: String,
    pub position: i64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ExerciseAlternative {
    pub id: i64,
    pub exercise_id: i64,
    pub key: String,
    pub text: String,
}

/// Study item joined with its subject feedback and generated exercises.
///
/// Exercises are generated content, not real exam questions, so their
/// correct key is included: the client grades them locally.
#[derive(Debug, Serialize)]
pub struct StudyItemView {
    pub id: i64,
    pub subject_feedback_id: i64,
    pub subject: String,
    pub evaluation: String,
    pub recommendations: String,
    pub explanation: Option<String>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub exercises: Vec<ExerciseView>,
}

#[derive(Debug, Serialize)]
pub struct ExerciseView {
    pub id: i64,
    pub statement: String,
    pub correct_key: String,
    pub alternatives: Vec<ExerciseAlternativeView>,
}

#[derive(Debug, Serialize)]
pub struct ExerciseAlternativeView {
    pub id: i64,
    pub key: String,
    pub text: String,
}

/// DTO for toggling study item completion.
#[derive(Debug, Deserialize)]
pub struct SetCompletedRequest {
    pub completed: bool,
}
