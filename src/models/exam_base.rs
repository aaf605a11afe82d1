// src/models/exam_base.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// Represents the 'exam_bases' table in the database.
/// An exam base groups the questions of one practice exam.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExamBase {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for creating a new exam base.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateExamBaseRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
}
