//! OpenAI-compatible chat completions classifier.

use clausecut::{Classifier, ClassifierError, Message};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4.1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Endpoint settings, read from `CLAUSECUT_API_BASE`, `CLAUSECUT_API_KEY`
/// and `CLAUSECUT_MODEL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, String> {
        let base_url = env::var("CLAUSECUT_API_BASE").ok();
        let api_key = env::var("CLAUSECUT_API_KEY").ok().filter(|k| !k.is_empty());

        // Self-hosted endpoints may run without a key.
        if base_url.is_none() && api_key.is_none() {
            return Err(
                "CLAUSECUT_API_KEY is not set (use --offline to run without a model)".to_string(),
            );
        }

        Ok(Self {
            base_url: base_url.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            api_key,
            model: env::var("CLAUSECUT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: &'a [Message],
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Returns the first choice's content.
fn reply_content(response: ChatResponse) -> Result<String, ClassifierError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(ClassifierError::EmptyReply)
}

fn transport_error(err: reqwest::Error) -> ClassifierError {
    if err.is_timeout() {
        ClassifierError::transport(format!("request timed out: {err}"))
    } else {
        ClassifierError::transport(err)
    }
}

/// Blocking chat completions client.
#[derive(Debug, Clone)]
pub struct OpenAiClassifier {
    client: reqwest::blocking::Client,
    endpoint: String,
    config: ApiConfig,
}

impl OpenAiClassifier {
    pub fn new(config: ApiConfig) -> Result<Self, ClassifierError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("clausecut/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(transport_error)?;

        Ok(Self {
            client,
            endpoint: config.endpoint(),
            config,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

impl Classifier for OpenAiClassifier {
    fn classify(&self, messages: &[Message]) -> Result<String, ClassifierError> {
        let body = ChatRequest {
            model: &self.config.model,
            temperature: 0.0,
            messages,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        tracing::debug!(model = %self.config.model, messages = messages.len(), "chat request");
        let response = request.send().map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(ClassifierError::transport(format!("HTTP {status}: {detail}")));
        }

        let response: ChatResponse = response.json().map_err(transport_error)?;
        reply_content(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> ApiConfig {
        ApiConfig {
            base_url: base_url.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
        }
    }

    #[test]
    fn test_endpoint() {
        assert_eq!(
            config("https://api.openai.com/v1/").endpoint(),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            config("http://localhost:8000/v1").endpoint(),
            "http://localhost:8000/v1/chat/completions"
        );
    }

    #[test]
    fn test_request_body() {
        let messages = [Message::system("監査"), Message::user("[001] 本文")];
        let body = ChatRequest {
            model: "gpt-4.1",
            temperature: 0.0,
            messages: &messages,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["model"], "gpt-4.1");
        assert_eq!(value["temperature"], 0.0);
        assert_eq!(value["messages"][1]["role"], "user");
    }

    #[test]
    fn test_reply_content() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "[[2,3]]"}}]}"#,
        )
        .unwrap();
        assert_eq!(reply_content(response).unwrap(), "[[2,3]]");

        let empty: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert_eq!(reply_content(empty), Err(ClassifierError::EmptyReply));
    }

    #[test]
    fn test_status_errors_classify() {
        let rate_limited = ClassifierError::transport(format!(
            "HTTP {}: slow down",
            reqwest::StatusCode::TOO_MANY_REQUESTS
        ));
        assert!(rate_limited.is_transient());

        let denied = ClassifierError::transport(format!(
            "HTTP {}: bad key",
            reqwest::StatusCode::UNAUTHORIZED
        ));
        assert!(!denied.is_transient());
    }
}
