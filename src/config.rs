// src/config.rs

use dotenvy::dotenv;
use std::env;
use url::Url;

/// Maximum number of generated exercises kept per study item.
pub const GENERATED_EXERCISE_COUNT: usize = 5;

/// Number of alternatives every generated exercise must carry.
pub const EXERCISE_ALTERNATIVE_COUNT: usize = 4;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub rust_log: String,
    /// Base URL of the OpenAI-compatible content generation API.
    pub ai_base_url: String,
    pub ai_api_key: String,
    pub ai_model: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let ai_base_url = env::var("AI_BASE_URL").expect("AI_BASE_URL must be set");
        Url::parse(&ai_base_url).expect("AI_BASE_URL must be a valid URL");

        let ai_api_key = env::var("AI_API_KEY").expect("AI_API_KEY must be set");

        let ai_model = env::var("AI_MODEL").unwrap_or_else(|_| "gpt-4.1-mini".to_string());

        Self {
            database_url,
            rust_log,
            ai_base_url,
            ai_api_key,
            ai_model,
        }
    }
}
