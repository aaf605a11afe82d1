// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub exam_base_id: i64,

    /// Subject used to group diagnostic feedback (e.g., "Anatomy").
    pub subject: String,

    /// The text content of the question.
    pub statement: String,

    /// Key of the correct alternative ("A".."Z"). Nullable: imported content
    /// may lack an answer key; scoring counts such questions as incorrect.
    pub correct_alternative_key: Option<String>,

    pub position: i64,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Represents the 'alternatives' table. At most one alternative per question
/// carries a given key (enforced by a unique constraint).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Alternative {
    pub id: i64,
    pub question_id: i64,
    pub key: String,
    pub text: String,
    pub explanation: Option<String>,
}

/// A question joined with its alternatives, as loaded for scoring.
#[derive(Debug, Clone)]
pub struct QuestionWithAlternatives {
    pub question: Question,
    pub alternatives: Vec<Alternative>,
}

/// DTO for sending a question to a client taking an exam or a retry.
/// Excludes the correct key and the alternative explanations so the right
/// answer cannot leak before the user has answered.
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub subject: String,
    pub statement: String,
    pub position: i64,
    pub alternatives: Vec<PublicAlternative>,
}

#[derive(Debug, Serialize)]
pub struct PublicAlternative {
    pub id: i64,
    pub key: String,
    pub text: String,
}

impl From<QuestionWithAlternatives> for PublicQuestion {
    fn from(q: QuestionWithAlternatives) -> Self {
        PublicQuestion {
            id: q.question.id,
            subject: q.question.subject,
            statement: q.question.statement,
            position: q.question.position,
            alternatives: q
                .alternatives
                .into_iter()
                .map(|a| PublicAlternative {
                    id: a.id,
                    key: a.key,
                    text: a.text,
                })
                .collect(),
        }
    }
}

/// DTO for creating a new question together with its alternatives.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 100))]
    pub subject: String,
    #[validate(length(min = 1, max = 5000))]
    pub statement: String,
    #[validate(custom(function = validate_alternative_key))]
    pub correct_alternative_key: Option<String>,
    #[validate(length(min = 2, max = 26), nested)]
    pub alternatives: Vec<CreateAlternativeRequest>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateAlternativeRequest {
    #[validate(custom(function = validate_alternative_key))]
    pub key: String,
    #[validate(length(min = 1, max = 2000))]
    pub text: String,
    #[validate(length(max = 5000))]
    pub explanation: Option<String>,
}

/// Alternative keys are single uppercase ASCII letters ("A".."Z").
fn validate_alternative_key(key: &str) -> Result<(), validator::ValidationError> {
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_uppercase() => Ok(()),
        _ => Err(validator::ValidationError::new("invalid_alternative_key")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_validation() {
        assert!(validate_alternative_key("A").is_ok());
        assert!(validate_alternative_key("Z").is_ok());
        assert!(validate_alternative_key("a").is_err());
        assert!(validate_alternative_key("AB").is_err());
        assert!(validate_alternative_key("").is_err());
        assert!(validate_alternative_key("1").is_err());
    }

    #[test]
    fn test_public_question_hides_correct_key() {
        let q = QuestionWithAlternatives {
            question: Question {
                id: 1,
                exam_base_id: 1,
                subject: "Anatomy".to_string(),
                statement: "Which bone?".to_string(),
                correct_alternative_key: Some("B".to_string()),
                position: 0,
                created_at: chrono::Utc::now(),
            },
            alternatives: vec![Alternative {
                id: 10,
                question_id: 1,
                key: "B".to_string(),
                text: "Femur".to_string(),
                explanation: Some("The longest bone.".to_string()),
            }],
        };

        let public = PublicQuestion::from(q);
        let json = serde_json::to_string(&public).unwrap();
        assert!(!json.contains("correct_alternative_key"));
        assert!(!json.contains("explanation"));
        assert!(json.contains("Femur"));
    }
}
