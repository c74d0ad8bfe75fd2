use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    // Relay
    pub bind_addr: String,
    pub target_language: String,

    // Status endpoint
    pub status_bind_addr: String,

    // Translation collaborator
    pub translation_api_url: String,
    pub translation_api_key: String,
    pub translation_model: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            // Relay listener
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:5001".to_string()),
            target_language: std::env::var("TARGET_LANGUAGE")
                .unwrap_or_else(|_| "en".to_string())
                .trim()
                .to_lowercase(),

            // Status endpoint
            status_bind_addr: std::env::var("STATUS_BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:5002".to_string()),

            // Translation collaborator
            translation_api_url: std::env::var("TRANSLATION_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string()),
            translation_api_key: std::env::var("TRANSLATION_API_KEY")
                .context("TRANSLATION_API_KEY not set")?,
            translation_model: std::env::var("TRANSLATION_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
        })
    }
}
