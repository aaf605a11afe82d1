// src/models/attempt.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

use crate::models::question::PublicQuestion;

/// Represents the 'attempts' table: one user's pass through an exam base's
/// questions, exam-mode.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    pub exam_base_id: i64,
    pub user_id: i64,
    pub started_at: chrono::DateTime<chrono::Utc>,

    /// Null while in progress. Set exactly once by `finish`; finishing
    /// twice is an error.
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,

    /// Recorded by the scoring engine at finish time.
    pub score_percentage: Option<f64>,
}

/// Represents the 'answers' table: one row per (attempt, question),
/// enforced by a unique constraint and mutated only via upsert.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Answer {
    pub id: i64,
    pub attempt_id: i64,
    pub question_id: i64,

    /// Null means unanswered / cleared.
    pub selected_alternative_id: Option<i64>,

    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Attempt with its questions (public form) and the answers recorded so far.
#[derive(Debug, Serialize)]
pub struct AttemptDetail {
    pub attempt: Attempt,
    pub questions: Vec<PublicQuestion>,
    pub answers: Vec<Answer>,
}

/// DTO for upserting an answer.
///
/// `selected_alternative_id` accepts null, an integer id, or a string id;
/// the empty string is normalized to null ("click again to deselect").
#[derive(Debug, Deserialize)]
pub struct UpsertAnswerRequest {
    #[serde(default, deserialize_with = "selected_alternative_from_any")]
    pub selected_alternative_id: Option<i64>,
}

/// DTO for upserting a retry answer. Unlike the primary attempt, a retry
/// answer always supplies a final choice; there is no clear-to-null.
#[derive(Debug, Deserialize)]
pub struct UpsertRetryAnswerRequest {
    pub selected_alternative_id: i64,
}

fn selected_alternative_from_any<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| Error::custom("selected_alternative_id must be an integer")),
        serde_json::Value::String(s) if s.is_empty() => Ok(None),
        serde_json::Value::String(s) => s
            .parse::<i64>()
            .map(Some)
            .map_err(|_| Error::custom("selected_alternative_id must be an integer")),
        _ => Err(Error::custom(
            "selected_alternative_id must be an integer or null",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Result<UpsertAnswerRequest, serde_json::Error> {
        serde_json::from_str(body)
    }

    #[test]
    fn test_accepts_integer_id() {
        let req = parse(r#"{"selected_alternative_id": 42}"#).unwrap();
        assert_eq!(req.selected_alternative_id, Some(42));
    }

    #[test]
    fn test_accepts_string_id() {
        let req = parse(r#"{"selected_alternative_id": "42"}"#).unwrap();
        assert_eq!(req.selected_alternative_id, Some(42));
    }

    #[test]
    fn test_empty_string_normalized_to_null() {
        let req = parse(r#"{"selected_alternative_id": ""}"#).unwrap();
        assert_eq!(req.selected_alternative_id, None);
    }

    #[test]
    fn test_null_and_missing_are_null() {
        let req = parse(r#"{"selected_alternative_id": null}"#).unwrap();
        assert_eq!(req.selected_alternative_id, None);

        let req = parse(r#"{}"#).unwrap();
        assert_eq!(req.selected_alternative_id, None);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse(r#"{"selected_alternative_id": true}"#).is_err());
        assert!(parse(r#"{"selected_alternative_id": "abc"}"#).is_err());
        assert!(parse(r#"{"selected_alternative_id": 1.5}"#).is_err());
    }
}
