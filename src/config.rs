// Configuration - Environment variables

use std::env;

/// Application configuration loaded from environment
#[derive(Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// SQLite database URL
    pub database_url: String,
    /// OpenAI-compatible API key for LLM calls
    pub openai_api_key: Option<String>,
    /// Base URL of the OpenAI-compatible API
    pub openai_base_url: String,
    /// Model identifier passed to the generation backend
    pub llm_model: String,
    /// Deployment environment (development, production, ...)
    pub environment: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://chat.db?mode=rwc".to_string()),
            openai_api_key: env::var("OPENAI_API_KEY").ok(),
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-5-mini".to_string()),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        }
    }

    /// Whether destructive maintenance operations are allowed
    pub fn is_development(&self) -> bool {
        self.environment != "production"
    }

    /// Validate that required configuration is present
    pub fn validate(&self) -> Result<(), String> {
        if self.openai_api_key.is_none() {
            tracing::warn!("OPENAI_API_KEY not set - streaming AI responses will fail");
        }
        Ok(())
    }
}
