// src/models/training.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

use crate::models::attempt::Attempt;
use crate::models::feedback::{StudyItemView, SubjectFeedback};

/// The five training stages, in lifecycle order.
///
/// Persisted as TEXT. The lifecycle order lives in `index_in_flow`, not in
/// variant declaration order, so reordering the enum cannot change it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum TrainingStage {
    Exam,
    Diagnosis,
    Study,
    Retry,
    Final,
}

impl TrainingStage {
    /// Zero-based position of the stage in the forward-only flow.
    pub fn index_in_flow(self) -> usize {
        match self {
            TrainingStage::Exam => 0,
            TrainingStage::Diagnosis => 1,
            TrainingStage::Study => 2,
            TrainingStage::Retry => 3,
            TrainingStage::Final => 4,
        }
    }

    /// Parses the wire representation. Returns None for unknown stages so
    /// callers can reject them as bad requests instead of serde errors.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "EXAM" => Some(TrainingStage::Exam),
            "DIAGNOSIS" => Some(TrainingStage::Diagnosis),
            "STUDY" => Some(TrainingStage::Study),
            "RETRY" => Some(TrainingStage::Retry),
            "FINAL" => Some(TrainingStage::Final),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrainingStage::Exam => "EXAM",
            TrainingStage::Diagnosis => "DIAGNOSIS",
            TrainingStage::Study => "STUDY",
            TrainingStage::Retry => "RETRY",
            TrainingStage::Final => "FINAL",
        }
    }
}

/// Represents the 'training_sessions' table: the five-stage wrapper
/// orchestrating one attempt plus diagnosis/study/retry/final.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TrainingSession {
    pub id: i64,
    pub attempt_id: i64,
    pub user_id: i64,
    pub current_stage: TrainingStage,

    /// Set once, on reaching FINAL. Never recomputed afterwards.
    pub final_score_percentage: Option<f64>,

    /// Opaque text, externally generated.
    pub final_feedback: Option<String>,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Represents the 'retry_answers' table: a second-chance answer, valid only
/// for questions answered incorrectly in the primary attempt.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RetryAnswer {
    pub id: i64,
    pub training_session_id: i64,
    pub question_id: i64,
    pub selected_alternative_id: i64,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for requesting a stage transition. The stage arrives as a raw string
/// and is parsed explicitly so unknown values map to a 400, not a serde
/// rejection.
#[derive(Debug, Deserialize)]
pub struct UpdateStageRequest {
    pub stage: String,
}

/// Attempt summary embedded in the session payload.
#[derive(Debug, Serialize)]
pub struct AttemptSummary {
    pub id: i64,
    pub exam_base_id: i64,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub score_percentage: Option<f64>,
    pub total_questions: i64,
    pub answered_questions: i64,
}

impl AttemptSummary {
    pub fn from_attempt(attempt: &Attempt, total_questions: i64, answered_questions: i64) -> Self {
        AttemptSummary {
            id: attempt.id,
            exam_base_id: attempt.exam_base_id,
            started_at: attempt.started_at,
            finished_at: attempt.finished_at,
            score_percentage: attempt.score_percentage,
            total_questions,
            answered_questions,
        }
    }
}

/// Before/after comparison, available once FINAL has computed a score.
#[derive(Debug, Serialize)]
pub struct FinalComparison {
    pub initial_percentage: f64,
    pub final_percentage: f64,
    pub initial_correct: i64,
    pub final_correct: i64,
    pub gain_points: i64,
    /// Rounded percentage delta. Negative is a representable outcome.
    pub gain_percent: i64,
}

/// Full current-state payload of a training session.
///
/// Feedbacks are present whenever the primary attempt is finished,
/// regardless of the current stage: the stage gates UI navigation, not
/// data availability.
#[derive(Debug, Serialize)]
pub struct TrainingSessionView {
    pub id: i64,
    pub current_stage: TrainingStage,
    pub final_score_percentage: Option<f64>,
    pub final_feedback: Option<String>,
    pub attempt: AttemptSummary,
    pub feedbacks: Vec<SubjectFeedback>,
    pub study_items: Vec<StudyItemView>,
    pub final_comparison: Option<FinalComparison>,
}

/// Response payload of starting an attempt: the attempt and the training
/// session created together with it.
#[derive(Debug, Serialize)]
pub struct StartedTraining {
    pub attempt: Attempt,
    pub session: TrainingSession,
}
