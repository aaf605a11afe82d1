//! AI content collaborator.
//!
//! The platform delegates diagnostic feedback and study content to an
//! external OpenAI-compatible model behind the `ContentGenerator` trait.
//! The input types below are the only data that ever reaches a prompt:
//! they carry statements, alternative texts and the user's selected key,
//! and structurally have no field for a question's correct key.

pub mod client;
pub mod error;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use client::HttpContentGenerator;
pub use error::AiError;

/// Context for one question the user got wrong in the primary attempt.
#[derive(Debug, Clone, Serialize)]
pub struct WrongQuestionContext {
    pub statement: String,
    pub alternatives: Vec<PromptAlternative>,

    /// Key the user picked in the original attempt, when any.
    pub selected_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptAlternative {
    pub key: String,
    pub text: String,
}

/// Input for a per-subject diagnosis call.
#[derive(Debug, Clone, Serialize)]
pub struct SubjectDiagnosisInput {
    pub subject: String,
    pub total_questions: usize,
    pub correct_count: usize,
    pub wrong_questions: Vec<WrongQuestionContext>,
}

/// Model output of a diagnosis call.
#[derive(Debug, Clone, Deserialize)]
pub struct SubjectDiagnosis {
    pub evaluation: String,
    pub recommendations: String,
}

/// Input for a study content call.
#[derive(Debug, Clone, Serialize)]
pub struct StudyContentInput {
    pub subject: String,
    pub recommendations: String,
    pub wrong_questions: Vec<WrongQuestionContext>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedAlternative {
    pub key: String,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedExercise {
    pub statement: String,
    pub alternatives: Vec<GeneratedAlternative>,
    pub correct_key: String,
}

/// Model output of a study content call. Exercises that failed to parse
/// have already been dropped; domain validation happens in the service
/// layer before anything is persisted.
#[derive(Debug, Clone)]
pub struct StudyContent {
    pub explanation: String,
    pub exercises: Vec<GeneratedExercise>,
}

/// Input for the closing feedback of a training session: the score
/// evolution plus the per-subject evaluations already generated.
#[derive(Debug, Clone, Serialize)]
pub struct FinalFeedbackInput {
    pub initial_percentage: f64,
    pub final_percentage: f64,
    pub gain_points: i64,
    pub subjects: Vec<SubjectOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubjectOutcome {
    pub subject: String,
    pub evaluation: String,
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn diagnose_subject(
        &self,
        input: &SubjectDiagnosisInput,
    ) -> Result<SubjectDiagnosis, AiError>;

    async fn generate_study_content(
        &self,
        input: &StudyContentInput,
    ) -> Result<StudyContent, AiError>;

    /// Free-text closing feedback; any non-empty reply is acceptable.
    async fn generate_final_feedback(&self, input: &FinalFeedbackInput)
    -> Result<String, AiError>;
}
