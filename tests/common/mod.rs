// tests/common/mod.rs
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use examtrain::ai::{ContentGenerator, HttpContentGenerator};
use examtrain::config::Config;
use examtrain::routes;
use examtrain::state::AppState;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

pub struct TestApp {
    pub address: String,
    pub pool: SqlitePool,
}

/// Helper to spawn the app on a random port for testing, backed by an
/// in-memory SQLite database. The AI endpoint points nowhere; tests that
/// exercise generation use `spawn_app_with_ai` with a wiremock server.
pub async fn spawn_app() -> TestApp {
    spawn_app_with_ai("http://127.0.0.1:1").await
}

pub async fn spawn_app_with_ai(ai_base_url: &str) -> TestApp {
    // A single connection keeps every request on the same in-memory
    // database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory sqlite");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        rust_log: "error".to_string(),
        ai_base_url: ai_base_url.to_string(),
        ai_api_key: "test-key".to_string(),
        ai_model: "test-model".to_string(),
    };

    let ai: Arc<dyn ContentGenerator> = Arc::new(HttpContentGenerator::new(
        ai_base_url,
        "test-key",
        "test-model",
    ));

    let state = AppState {
        pool: pool.clone(),
        config,
        ai,
    };

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp { address, pool }
}

/// Creates an exam base through the API and returns its id.
pub async fn seed_exam_base(client: &reqwest::Client, address: &str) -> i64 {
    let title = format!("Exam {}", uuid::Uuid::new_v4());
    let response = client
        .post(format!("{}/api/exam-bases", address))
        .json(&serde_json::json!({ "title": title }))
        .send()
        .await
        .expect("Failed to create exam base");
    assert_eq!(response.status().as_u16(), 201);

    let created: serde_json::Value = response.json().await.unwrap();
    created["id"].as_i64().unwrap()
}

/// Creates a question with alternatives A..D through the API. Returns the
/// question id and a key -> alternative id map.
pub async fn seed_question(
    client: &reqwest::Client,
    address: &str,
    exam_base_id: i64,
    subject: &str,
    correct_key: Option<&str>,
) -> (i64, HashMap<String, i64>) {
    let body = serde_json::json!({
        "subject": subject,
        "statement": format!("Question {}", uuid::Uuid::new_v4()),
        "correct_alternative_key": correct_key,
        "alternatives": [
            {"key": "A", "text": "Alternative A"},
            {"key": "B", "text": "Alternative B"},
            {"key": "C", "text": "Alternative C"},
            {"key": "D", "text": "Alternative D"},
        ],
    });

    let response = client
        .post(format!(
            "{}/api/exam-bases/{}/questions",
            address, exam_base_id
        ))
        .json(&body)
        .send()
        .await
        .expect("Failed to create question");
    assert_eq!(response.status().as_u16(), 201);

    let created: serde_json::Value = response.json().await.unwrap();
    let question_id = created["question"]["id"].as_i64().unwrap();
    let mut alternatives = HashMap::new();
    for alternative in created["alternatives"].as_array().unwrap() {
        alternatives.insert(
            alternative["key"].as_str().unwrap().to_string(),
            alternative["id"].as_i64().unwrap(),
        );
    }
    (question_id, alternatives)
}

/// Inserts a question with four alternatives directly through the pool.
/// Used by tests that seed large exams.
pub async fn seed_question_sql(
    pool: &SqlitePool,
    exam_base_id: i64,
    subject: &str,
    position: i64,
    correct_key: Option<&str>,
) -> (i64, HashMap<String, i64>) {
    let now = chrono::Utc::now();
    let question_id: i64 = sqlx::query_scalar(
        "INSERT INTO questions (exam_base_id, subject, statement, correct_alternative_key, position, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING id",
    )
    .bind(exam_base_id)
    .bind(subject)
    .bind(format!("Question {}", position))
    .bind(correct_key)
    .bind(position)
    .bind(now)
    .fetch_one(pool)
    .await
    .unwrap();

    let mut alternatives = HashMap::new();
    for key in ["A", "B", "C", "D"] {
        let alternative_id: i64 = sqlx::query_scalar(
            "INSERT INTO alternatives (question_id, key, text) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(question_id)
        .bind(key)
        .bind(format!("Alternative {}", key))
        .fetch_one(pool)
        .await
        .unwrap();
        alternatives.insert(key.to_string(), alternative_id);
    }
    (question_id, alternatives)
}

/// Inserts an answer row directly through the pool.
pub async fn seed_answer_sql(
    pool: &SqlitePool,
    attempt_id: i64,
    question_id: i64,
    selected_alternative_id: Option<i64>,
) {
    sqlx::query(
        "INSERT INTO answers (attempt_id, question_id, selected_alternative_id, updated_at)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(attempt_id)
    .bind(question_id)
    .bind(selected_alternative_id)
    .bind(chrono::Utc::now())
    .execute(pool)
    .await
    .unwrap();
}

/// Inserts a subject feedback row directly through the pool, bypassing the
/// AI collaborator.
pub async fn seed_subject_feedback_sql(pool: &SqlitePool, attempt_id: i64, subject: &str) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO subject_feedbacks (attempt_id, subject, evaluation, recommendations, created_at)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id",
    )
    .bind(attempt_id)
    .bind(subject)
    .bind(format!("Evaluation for {}", subject))
    .bind(format!("Recommendations for {}", subject))
    .bind(chrono::Utc::now())
    .fetch_one(pool)
    .await
    .unwrap()
}

/// Starts an attempt as the given user. Returns (attempt_id, session_id).
pub async fn start_attempt(
    client: &reqwest::Client,
    address: &str,
    exam_base_id: i64,
    user_id: i64,
) -> (i64, i64) {
    let response = client
        .post(format!("{}/api/exam-bases/{}/attempts", address, exam_base_id))
        .header("X-User-Id", user_id.to_string())
        .send()
        .await
        .expect("Failed to start attempt");
    assert_eq!(response.status().as_u16(), 201);

    let started: serde_json::Value = response.json().await.unwrap();
    (
        started["attempt"]["id"].as_i64().unwrap(),
        started["session"]["id"].as_i64().unwrap(),
    )
}

pub async fn put_answer(
    client: &reqwest::Client,
    address: &str,
    exam_base_id: i64,
    attempt_id: i64,
    question_id: i64,
    selected: serde_json::Value,
    user_id: i64,
) -> reqwest::Response {
    client
        .put(format!(
            "{}/api/exam-bases/{}/attempts/{}/answers/{}",
            address, exam_base_id, attempt_id, question_id
        ))
        .header("X-User-Id", user_id.to_string())
        .json(&serde_json::json!({ "selected_alternative_id": selected }))
        .send()
        .await
        .expect("Failed to send answer")
}

pub async fn finish_attempt(
    client: &reqwest::Client,
    address: &str,
    exam_base_id: i64,
    attempt_id: i64,
    user_id: i64,
) -> reqwest::Response {
    client
        .post(format!(
            "{}/api/exam-bases/{}/attempts/{}/finish",
            address, exam_base_id, attempt_id
        ))
        .header("X-User-Id", user_id.to_string())
        .send()
        .await
        .expect("Failed to finish attempt")
}

pub async fn update_stage(
    client: &reqwest::Client,
    address: &str,
    session_id: i64,
    stage: &str,
    user_id: i64,
) -> reqwest::Response {
    client
        .put(format!(
            "{}/api/training-sessions/{}/stage",
            address, session_id
        ))
        .header("X-User-Id", user_id.to_string())
        .json(&serde_json::json!({ "stage": stage }))
        .send()
        .await
        .expect("Failed to update stage")
}

pub async fn get_session(
    client: &reqwest::Client,
    address: &str,
    session_id: i64,
    user_id: i64,
) -> serde_json::Value {
    let response = client
        .get(format!("{}/api/training-sessions/{}", address, session_id))
        .header("X-User-Id", user_id.to_string())
        .send()
        .await
        .expect("Failed to fetch session");
    assert_eq!(response.status().as_u16(), 200);
    response.json().await.unwrap()
}

pub async fn put_retry_answer(
    client: &reqwest::Client,
    address: &str,
    session_id: i64,
    question_id: i64,
    selected_alternative_id: i64,
    user_id: i64,
) -> reqwest::Response {
    client
        .put(format!(
            "{}/api/training-sessions/{}/retry/answers/{}",
            address, session_id, question_id
        ))
        .header("X-User-Id", user_id.to_string())
        .json(&serde_json::json!({ "selected_alternative_id": selected_alternative_id }))
        .send()
        .await
        .expect("Failed to send retry answer")
}

pub async fn get_retry_questions(
    client: &reqwest::Client,
    address: &str,
    session_id: i64,
    user_id: i64,
) -> reqwest::Response {
    client
        .get(format!(
            "{}/api/training-sessions/{}/retry/questions",
            address, session_id
        ))
        .header("X-User-Id", user_id.to_string())
        .send()
        .await
        .expect("Failed to fetch retry questions")
}
