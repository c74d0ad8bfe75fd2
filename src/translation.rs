//! Translation collaborator: an OpenAI-compatible chat-completions endpoint
//! consumed as an opaque text-in/text-out function.
//!
//! The relay treats translation as a blocking external call; the phase
//! registry lock is never held while a request is in flight.

use crate::config::Config;
use crate::retry::{with_retry_if, RetryConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct TranslationRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

fn build_system_prompt(source: &str, target: &str) -> String {
    format!(
        "You are a professional translator. Translate the user's message from \
         the language with ISO 639-1 code '{}' to the language with code '{}'. \
         Reply with the translated text only: no quotes, no commentary, and \
         preserve the original formatting and emojis.",
        source, target
    )
}

/// Translate `text` from `source` to `target`.
///
/// If the two codes are equal the identity transform applies and no request
/// is made. Transient failures (429, 5xx, network errors) are retried with
/// backoff; other client errors fail immediately. An error here is fatal to
/// the calling handler only.
pub async fn translate_text(
    client: &reqwest::Client,
    config: &Config,
    text: &str,
    source: &str,
    target: &str,
) -> Result<String> {
    if source == target {
        return Ok(text.to_string());
    }

    let request = TranslationRequest {
        model: config.translation_model.clone(),
        messages: vec![
            Message {
                role: "system".to_string(),
                content: build_system_prompt(source, target),
            },
            Message {
                role: "user".to_string(),
                content: text.to_string(),
            },
        ],
        temperature: 0.3,
    };

    with_retry_if(
        &RetryConfig::api_call(),
        &format!("translation {} -> {}", source, target),
        || async {
            let response = client
                .post(&config.translation_api_url)
                .header(
                    "Authorization",
                    format!("Bearer {}", config.translation_api_key),
                )
                .header("Content-Type", "application/json")
                .json(&request)
                .send()
                .await
                .context("failed to send request to translation API")?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
                anyhow::bail!("translation API error ({}): {}", status, body);
            }

            let chat_response: ChatResponse = response
                .json()
                .await
                .context("failed to parse translation API response")?;

            chat_response
                .choices
                .first()
                .map(|c| c.message.content.clone())
                .context("translation API response contained no choices")
        },
        is_retryable_error,
    )
    .await
}

/// Retry 429 and 5xx responses plus network-level failures; other 4xx
/// client errors (bad key, bad request) fail fast.
fn is_retryable_error(error: &anyhow::Error) -> bool {
    let error_str = error.to_string();

    // Error format: "translation API error (500 Internal Server Error): ..."
    if error_str.contains("translation API error") {
        if let Some(start) = error_str.find('(') {
            if let Some(end) = error_str[start..].find(')') {
                let status_str = &error_str[start + 1..start + end];
                let status_num = status_str.split_whitespace().next().unwrap_or("");
                if let Ok(status) = status_num.parse::<u16>() {
                    return status == 429 || status >= 500;
                }
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn create_test_config(api_url: &str) -> Config {
        Config {
            bind_addr: "127.0.0.1:0".to_string(),
            target_language: "en".to_string(),
            status_bind_addr: "127.0.0.1:0".to_string(),
            translation_api_url: api_url.to_string(),
            translation_api_key: "test-key".to_string(),
            translation_model: "gpt-4o-mini".to_string(),
        }
    }

    fn create_chat_response(content: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "choices": [
                {
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": content
                    },
                    "finish_reason": "stop"
                }
            ]
        })
    }

    // ==================== Identity Tests ====================

    #[tokio::test]
    async fn test_same_language_skips_api_call() {
        // An unreachable URL proves no request is made.
        let config = create_test_config("http://invalid-url-should-not-be-called.test");
        let client = reqwest::Client::new();

        let result = translate_text(&client, &config, "hello", "en", "en")
            .await
            .expect("identity translation should succeed");
        assert_eq!(result, "hello");
    }

    // ==================== HTTP Tests ====================

    #[tokio::test]
    async fn test_translates_foreign_text() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(create_chat_response("hello world")),
            )
            .mount(&mock_server)
            .await;

        let config = create_test_config(&format!("{}/v1/chat/completions", mock_server.uri()));
        let client = reqwest::Client::new();

        let result = translate_text(&client, &config, "שלום עולם", "he", "en")
            .await
            .expect("should succeed");
        assert_eq!(result, "hello world");
    }

    #[tokio::test]
    async fn test_empty_choices_is_an_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&mock_server)
            .await;

        let config = create_test_config(&format!("{}/v1/chat/completions", mock_server.uri()));
        let client = reqwest::Client::new();

        let result = translate_text(&client, &config, "hola", "es", "en").await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("no choices"));
    }

    #[tokio::test]
    async fn test_retries_on_500_then_succeeds() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .up_to_n_times(2)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(create_chat_response("good")))
            .mount(&mock_server)
            .await;

        let config = create_test_config(&format!("{}/v1/chat/completions", mock_server.uri()));
        let client = reqwest::Client::new();

        let result = translate_text(&client, &config, "hola", "es", "en").await;
        assert!(result.is_ok(), "should succeed after retries: {:?}", result);
        assert_eq!(result.unwrap(), "good");
    }

    #[tokio::test]
    async fn test_no_retry_on_401() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let config = create_test_config(&format!("{}/v1/chat/completions", mock_server.uri()));
        let client = reqwest::Client::new();

        let start = std::time::Instant::now();
        let result = translate_text(&client, &config, "hola", "es", "en").await;

        assert!(result.is_err());
        assert!(
            start.elapsed() < std::time::Duration::from_secs(1),
            "401 must fail without retry delays"
        );
    }

    // ==================== is_retryable_error Tests ====================

    #[test]
    fn test_is_retryable_error_statuses() {
        let retryable = anyhow::anyhow!("translation API error (503 Service Unavailable): down");
        assert!(is_retryable_error(&retryable));

        let rate_limited = anyhow::anyhow!("translation API error (429 Too Many Requests): slow");
        assert!(is_retryable_error(&rate_limited));

        let client_error = anyhow::anyhow!("translation API error (400 Bad Request): nope");
        assert!(!is_retryable_error(&client_error));
    }

    #[test]
    fn test_network_errors_are_retryable() {
        let error = anyhow::anyhow!("failed to send request to translation API: refused");
        assert!(is_retryable_error(&error));
    }

    // ==================== Prompt Tests ====================

    #[test]
    fn test_system_prompt_names_both_languages() {
        let prompt = build_system_prompt("he", "en");
        assert!(prompt.contains("'he'"));
        assert!(prompt.contains("'en'"));
        assert!(prompt.contains("translated text only"));
    }
}
