//! OpenAI-compatible HTTP implementation of the content generator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ai::{
    AiError, ContentGenerator, FinalFeedbackInput, GeneratedExercise, StudyContent,
    StudyContentInput, SubjectDiagnosis, SubjectDiagnosisInput,
};
use crate::config::Config;

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const MAX_TOKENS: u32 = 4096;

const DIAGNOSIS_SYSTEM_PROMPT: &str = "You are an exam tutor writing diagnostic feedback. \
You receive one exam subject with the student's results and the questions they missed. \
Respond ONLY with a JSON object of the form \
{\"evaluation\": \"...\", \"recommendations\": \"...\"} \
where evaluation assesses the student's performance in the subject and \
recommendations lists what to study next. No markdown, no extra keys.";

const STUDY_SYSTEM_PROMPT: &str = "You are an exam tutor writing study material. \
You receive one exam subject with study recommendations and the questions the student missed. \
Respond ONLY with a JSON object of the form \
{\"explanation\": \"...\", \"exercises\": [{\"statement\": \"...\", \
\"alternatives\": [{\"key\": \"A\", \"text\": \"...\"}, ...], \"correct_key\": \"A\"}]} \
with exactly 5 exercises, each with 4 alternatives keyed A to D and exactly one correct. \
No markdown, no extra keys.";

const FINAL_FEEDBACK_SYSTEM_PROMPT: &str = "You are an exam tutor writing a short closing \
message for a completed training session. You receive the student's initial and final \
scores and the per-subject evaluations. Respond with 2-4 encouraging plain-text sentences \
summarizing the evolution and what to focus on next. No markdown, no JSON.";

/// Content generator backed by an OpenAI-compatible chat completions API.
pub struct HttpContentGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpContentGenerator {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.ai_base_url, &config.ai_api_key, &config.ai_model)
    }

    /// Sends one chat completion request and returns the first choice's
    /// content.
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String, AiError> {
        let body = ChatRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            temperature: 0.2,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt.to_string(),
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AiError::Timeout(DEFAULT_TIMEOUT_SECS)
                } else {
                    AiError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status >= 400 {
            let message = response.text().await.unwrap_or_default();
            return Err(AiError::ApiError { status, message });
        }

        let api_response: ChatResponse = response.json().await.map_err(|e| {
            AiError::MalformedOutput(format!("failed to parse API response: {e}"))
        })?;

        api_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AiError::MalformedOutput("response contained no choices".to_string()))
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Lenient shape for study content: exercises are parsed individually so a
/// single malformed one does not discard the whole reply.
#[derive(Deserialize)]
struct RawStudyContent {
    explanation: String,
    #[serde(default)]
    exercises: Vec<serde_json::Value>,
}

#[async_trait]
impl ContentGenerator for HttpContentGenerator {
    async fn diagnose_subject(
        &self,
        input: &SubjectDiagnosisInput,
    ) -> Result<SubjectDiagnosis, AiError> {
        let user_prompt = prompt_payload(input)?;
        let content = self.chat(DIAGNOSIS_SYSTEM_PROMPT, &user_prompt).await?;

        serde_json::from_str(extract_json(&content)).map_err(|e| {
            AiError::MalformedOutput(format!("diagnosis was not the expected JSON: {e}"))
        })
    }

    async fn generate_study_content(
        &self,
        input: &StudyContentInput,
    ) -> Result<StudyContent, AiError> {
        let user_prompt = prompt_payload(input)?;
        let content = self.chat(STUDY_SYSTEM_PROMPT, &user_prompt).await?;

        let raw: RawStudyContent = serde_json::from_str(extract_json(&content)).map_err(|e| {
            AiError::MalformedOutput(format!("study content was not the expected JSON: {e}"))
        })?;

        let exercises = raw
            .exercises
            .into_iter()
            .filter_map(|value| serde_json::from_value::<GeneratedExercise>(value).ok())
            .collect();

        Ok(StudyContent {
            explanation: raw.explanation,
            exercises,
        })
    }

    async fn generate_final_feedback(
        &self,
        input: &FinalFeedbackInput,
    ) -> Result<String, AiError> {
        let user_prompt = prompt_payload(input)?;
        let content = self.chat(FINAL_FEEDBACK_SYSTEM_PROMPT, &user_prompt).await?;

        let feedback = content.trim();
        if feedback.is_empty() {
            return Err(AiError::MalformedOutput(
                "final feedback was empty".to_string(),
            ));
        }
        Ok(feedback.to_string())
    }
}

/// Serializes a prompt input as pretty JSON. The input types themselves
/// guarantee no correct answer key is present.
fn prompt_payload<T: Serialize>(input: &T) -> Result<String, AiError> {
    serde_json::to_string_pretty(input)
        .map_err(|e| AiError::MalformedOutput(format!("failed to encode prompt payload: {e}")))
}

/// Strips an optional markdown code fence around the model's JSON reply.
fn extract_json(content: &str) -> &str {
    let trimmed = content.trim();
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.strip_suffix("```").unwrap_or(rest))
        .unwrap_or(trimmed);
    inner.trim()
}
