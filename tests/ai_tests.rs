// tests/ai_tests.rs
//
// Generation flows against a mocked AI collaborator.

mod common;

use common::*;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USER: i64 = 1;

fn chat_body(content: &str) -> serde_json::Value {
    serde_json::json!({
        "choices": [{"message": {"content": content, "role": "assistant"}, "index": 0}]
    })
}

fn diagnosis_content() -> String {
    serde_json::json!({
        "evaluation": "Performance in this subject needs work.",
        "recommendations": "Review the fundamentals before retrying."
    })
    .to_string()
}

fn valid_exercise(index: usize) -> serde_json::Value {
    serde_json::json!({
        "statement": format!("Generated exercise {}", index),
        "alternatives": [
            {"key": "A", "text": "first"},
            {"key": "B", "text": "second"},
            {"key": "C", "text": "third"},
            {"key": "D", "text": "fourth"},
        ],
        "correct_key": "B"
    })
}

async fn post_diagnosis(
    client: &reqwest::Client,
    address: &str,
    session_id: i64,
) -> reqwest::Response {
    client
        .post(format!(
            "{}/api/training-sessions/{}/diagnosis",
            address, session_id
        ))
        .header("X-User-Id", USER.to_string())
        .send()
        .await
        .expect("Failed to request diagnosis")
}

async fn post_study_content(
    client: &reqwest::Client,
    address: &str,
    session_id: i64,
    item_id: i64,
) -> reqwest::Response {
    client
        .post(format!(
            "{}/api/training-sessions/{}/study-items/{}/content",
            address, session_id, item_id
        ))
        .header("X-User-Id", USER.to_string())
        .send()
        .await
        .expect("Failed to request study content")
}

#[tokio::test]
async fn diagnosis_creates_feedback_per_subject() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(&diagnosis_content())))
        .expect(2)
        .mount(&server)
        .await;

    let app = spawn_app_with_ai(&server.uri()).await;
    let client = reqwest::Client::new();
    let base_id = seed_exam_base(&client, &app.address).await;
    seed_question(&client, &app.address, base_id, "Anatomy", Some("A")).await;
    seed_question(&client, &app.address, base_id, "Physiology", Some("A")).await;
    let (attempt_id, session_id) = start_attempt(&client, &app.address, base_id, USER).await;
    finish_attempt(&client, &app.address, base_id, attempt_id, USER).await;

    let response = post_diagnosis(&client, &app.address, session_id).await;
    assert_eq!(response.status().as_u16(), 200);

    let feedbacks: Vec<serde_json::Value> = response.json().await.unwrap();
    assert_eq!(feedbacks.len(), 2);
    let subjects: Vec<&str> = feedbacks
        .iter()
        .map(|f| f["subject"].as_str().unwrap())
        .collect();
    assert_eq!(subjects, vec!["Anatomy", "Physiology"]);
}

#[tokio::test]
async fn diagnosis_skips_subjects_that_already_have_feedback() {
    let server = MockServer::start().await;
    // Two subjects, one call each; the second invocation must not call the
    // collaborator again.
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(&diagnosis_content())))
        .expect(2)
        .mount(&server)
        .await;

    let app = spawn_app_with_ai(&server.uri()).await;
    let client = reqwest::Client::new();
    let base_id = seed_exam_base(&client, &app.address).await;
    seed_question(&client, &app.address, base_id, "Anatomy", Some("A")).await;
    seed_question(&client, &app.address, base_id, "Physiology", Some("A")).await;
    let (attempt_id, session_id) = start_attempt(&client, &app.address, base_id, USER).await;
    finish_attempt(&client, &app.address, base_id, attempt_id, USER).await;

    for _ in 0..2 {
        let response = post_diagnosis(&client, &app.address, session_id).await;
        assert_eq!(response.status().as_u16(), 200);
    }

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subject_feedbacks WHERE attempt_id = $1")
        .bind(attempt_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn diagnosis_requires_a_finished_attempt() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let base_id = seed_exam_base(&client, &app.address).await;
    seed_question(&client, &app.address, base_id, "Anatomy", Some("A")).await;
    let (_, session_id) = start_attempt(&client, &app.address, base_id, USER).await;

    let response = post_diagnosis(&client, &app.address, session_id).await;
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn malformed_model_output_is_a_bad_gateway_and_persists_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(chat_body("I am sorry, I cannot do that.")),
        )
        .mount(&server)
        .await;

    let app = spawn_app_with_ai(&server.uri()).await;
    let client = reqwest::Client::new();
    let base_id = seed_exam_base(&client, &app.address).await;
    seed_question(&client, &app.address, base_id, "Anatomy", Some("A")).await;
    let (attempt_id, session_id) = start_attempt(&client, &app.address, base_id, USER).await;
    finish_attempt(&client, &app.address, base_id, attempt_id, USER).await;

    let response = post_diagnosis(&client, &app.address, session_id).await;
    assert_eq!(response.status().as_u16(), 502);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subject_feedbacks WHERE attempt_id = $1")
        .bind(attempt_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn upstream_error_is_a_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let app = spawn_app_with_ai(&server.uri()).await;
    let client = reqwest::Client::new();
    let base_id = seed_exam_base(&client, &app.address).await;
    seed_question(&client, &app.address, base_id, "Anatomy", Some("A")).await;
    let (attempt_id, session_id) = start_attempt(&client, &app.address, base_id, USER).await;
    finish_attempt(&client, &app.address, base_id, attempt_id, USER).await;

    let response = post_diagnosis(&client, &app.address, session_id).await;
    assert_eq!(response.status().as_u16(), 502);
}

#[tokio::test]
async fn study_content_keeps_at_most_five_valid_exercises() {
    // Seven exercises: the first is malformed (three alternatives) and must
    // be skipped; of the six valid ones only five are kept.
    let mut exercises = vec![serde_json::json!({
        "statement": "Broken exercise",
        "alternatives": [
            {"key": "A", "text": "first"},
            {"key": "B", "text": "second"},
            {"key": "C", "text": "third"},
        ],
        "correct_key": "A"
    })];
    for index in 1..=6 {
        exercises.push(valid_exercise(index));
    }
    let content = serde_json::json!({
        "explanation": "Everything you need to know.",
        "exercises": exercises,
    })
    .to_string();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(&content)))
        .expect(1)
        .mount(&server)
        .await;

    let app = spawn_app_with_ai(&server.uri()).await;
    let client = reqwest::Client::new();
    let base_id = seed_exam_base(&client, &app.address).await;
    seed_question(&client, &app.address, base_id, "Anatomy", Some("A")).await;
    let (attempt_id, session_id) = start_attempt(&client, &app.address, base_id, USER).await;
    finish_attempt(&client, &app.address, base_id, attempt_id, USER).await;
    seed_subject_feedback_sql(&app.pool, attempt_id, "Anatomy").await;
    update_stage(&client, &app.address, session_id, "STUDY", USER).await;

    let view = get_session(&client, &app.address, session_id, USER).await;
    let item_id = view["study_items"][0]["id"].as_i64().unwrap();

    let response = post_study_content(&client, &app.address, session_id, item_id).await;
    assert_eq!(response.status().as_u16(), 200);
    let item: serde_json::Value = response.json().await.unwrap();
    assert_eq!(item["explanation"], "Everything you need to know.");
    let generated = item["exercises"].as_array().unwrap();
    assert_eq!(generated.len(), 5);
    assert_eq!(generated[0]["statement"], "Generated exercise 1");
    assert_eq!(generated[0]["alternatives"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn study_content_is_generated_only_once() {
    let content = serde_json::json!({
        "explanation": "Short and sweet.",
        "exercises": [valid_exercise(1)],
    })
    .to_string();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(&content)))
        .expect(1)
        .mount(&server)
        .await;

    let app = spawn_app_with_ai(&server.uri()).await;
    let client = reqwest::Client::new();
    let base_id = seed_exam_base(&client, &app.address).await;
    seed_question(&client, &app.address, base_id, "Anatomy", Some("A")).await;
    let (attempt_id, session_id) = start_attempt(&client, &app.address, base_id, USER).await;
    finish_attempt(&client, &app.address, base_id, attempt_id, USER).await;
    seed_subject_feedback_sql(&app.pool, attempt_id, "Anatomy").await;
    update_stage(&client, &app.address, session_id, "STUDY", USER).await;

    let view = get_session(&client, &app.address, session_id, USER).await;
    let item_id = view["study_items"][0]["id"].as_i64().unwrap();

    for _ in 0..2 {
        let response = post_study_content(&client, &app.address, session_id, item_id).await;
        assert_eq!(response.status().as_u16(), 200);
        let item: serde_json::Value = response.json().await.unwrap();
        assert_eq!(item["explanation"], "Short and sweet.");
        assert_eq!(item["exercises"].as_array().unwrap().len(), 1);
    }
}

#[tokio::test]
async fn final_feedback_is_generated_once_in_final_stage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(chat_body("Solid improvement overall.")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let app = spawn_app_with_ai(&server.uri()).await;
    let client = reqwest::Client::new();
    let base_id = seed_exam_base(&client, &app.address).await;
    seed_question(&client, &app.address, base_id, "Anatomy", Some("A")).await;
    let (attempt_id, session_id) = start_attempt(&client, &app.address, base_id, USER).await;
    finish_attempt(&client, &app.address, base_id, attempt_id, USER).await;

    let url = format!(
        "{}/api/training-sessions/{}/final-feedback",
        app.address, session_id
    );

    // Not in FINAL yet.
    let early = client
        .post(&url)
        .header("X-User-Id", USER.to_string())
        .send()
        .await
        .expect("Failed to request final feedback");
    assert_eq!(early.status().as_u16(), 409);

    update_stage(&client, &app.address, session_id, "FINAL", USER).await;

    for _ in 0..2 {
        let response = client
            .post(&url)
            .header("X-User-Id", USER.to_string())
            .send()
            .await
            .expect("Failed to request final feedback");
        assert_eq!(response.status().as_u16(), 200);
        let session: serde_json::Value = response.json().await.unwrap();
        assert_eq!(session["final_feedback"], "Solid improvement overall.");
    }
}

#[tokio::test]
async fn study_item_of_another_session_is_not_found() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let base_id = seed_exam_base(&client, &app.address).await;
    seed_question(&client, &app.address, base_id, "Anatomy", Some("A")).await;
    let (_, session_id) = start_attempt(&client, &app.address, base_id, USER).await;

    let response = post_study_content(&client, &app.address, session_id, 9_999).await;
    assert_eq!(response.status().as_u16(), 404);
}
