use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::SqlitePool;

use crate::ai::ContentGenerator;
use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub ai: Arc<dyn ContentGenerator>,
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Arc<dyn ContentGenerator> {
    fn from_ref(state: &AppState) -> Self {
        state.ai.clone()
    }
}
