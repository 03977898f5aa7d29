//! Text backend abstraction for fragment generation.
//!
//! The [`TextBackend`] trait decouples the webmaster agent from the actual
//! completion service (currently an OpenAI-compatible chat-completions
//! endpoint). Tests use scripted backends that return predetermined replies
//! without touching the network.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::types::Usage;

/// Replies larger than this are treated as invalid before any parsing.
const MAX_RESPONSE_BODY_BYTES: usize = 1_000_000;

/// Parameters for a single completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    /// System/developer instruction (the project prompt).
    pub system: String,
    /// User instruction embedding the current fragment.
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Whole-call deadline. Expiry is a failure, never retried.
    pub timeout: Duration,
}

/// Best single completion returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<Usage>,
}

/// Every way a backend call can fail. Callers treat all of them as
/// "generation failed"; the variant only feeds diagnostics.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{var} is not set in environment")]
    MissingApiKey { var: String },
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("quota exceeded or rate limited: {0}")]
    Quota(String),
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl BackendError {
    /// Short stable label used in strategy strings.
    pub fn reason(&self) -> &'static str {
        match self {
            BackendError::MissingApiKey { .. } => "missing_api_key",
            BackendError::Auth(_) => "auth",
            BackendError::Quota(_) => "quota",
            BackendError::Status { .. } => "backend_status",
            BackendError::Timeout(_) => "timeout",
            BackendError::Network(_) => "network",
            BackendError::InvalidResponse(_) => "invalid_response",
        }
    }
}

/// Abstraction over completion backends.
pub trait TextBackend {
    /// Run exactly one completion. Implementations must not retry.
    fn complete(&self, request: &CompletionRequest) -> Result<Completion, BackendError>;
}

/// Backend speaking the OpenAI chat-completions protocol.
pub struct OpenAiBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    api_key_env: String,
}

impl OpenAiBackend {
    /// `api_key` is resolved by the caller (usually from `api_key_env`); a
    /// missing key only fails when a completion is actually requested.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        api_key_env: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            api_key_env: api_key_env.into(),
        }
    }
}

impl TextBackend for OpenAiBackend {
    #[instrument(skip_all, fields(model = %request.model, timeout_secs = request.timeout.as_secs()))]
    fn complete(&self, request: &CompletionRequest) -> Result<Completion, BackendError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| BackendError::MissingApiKey {
                var: self.api_key_env.clone(),
            })?;

        let body = ChatRequest {
            model: &request.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        info!(url = %self.base_url, "requesting completion");
        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(api_key)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .map_err(|err| map_transport_error(err, request.timeout))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|err| map_transport_error(err, request.timeout))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "backend returned error status");
            return Err(classify_status(status, text));
        }
        if text.len() > MAX_RESPONSE_BODY_BYTES {
            return Err(BackendError::InvalidResponse(format!(
                "response body of {} bytes exceeds {MAX_RESPONSE_BODY_BYTES}",
                text.len()
            )));
        }

        let completion = parse_chat_response(&text)?;
        debug!(
            bytes = completion.text.len(),
            total_tokens = completion.usage.map(|u| u.total_tokens),
            "completion received"
        );
        Ok(completion)
    }
}

fn map_transport_error(err: reqwest::Error, timeout: Duration) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout(timeout)
    } else {
        BackendError::Network(err.to_string())
    }
}

/// Map a non-success HTTP status to a backend error.
pub fn classify_status(status: StatusCode, body: String) -> BackendError {
    match status.as_u16() {
        401 | 403 => BackendError::Auth(body),
        429 => BackendError::Quota(body),
        code => BackendError::Status { status: code, body },
    }
}

/// Parse a chat-completions response body into the first choice's text.
pub fn parse_chat_response(body: &str) -> Result<Completion, BackendError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|err| BackendError::InvalidResponse(format!("parse response json: {err}")))?;
    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| BackendError::InvalidResponse("response has no content".to_string()))?;
    Ok(Completion {
        text,
        usage: parsed.usage,
    })
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "gpt-4o-mini".to_string(),
            system: "system".to_string(),
            user: "user".to_string(),
            max_tokens: 64,
            temperature: 0.2,
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn parses_first_choice_and_usage() {
        let body = r#"{
            "choices": [
                {"message": {"role": "assistant", "content": "<p>one</p>"}},
                {"message": {"role": "assistant", "content": "<p>two</p>"}}
            ],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;
        let completion = parse_chat_response(body).expect("parse");
        assert_eq!(completion.text, "<p>one</p>");
        assert_eq!(
            completion.usage,
            Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15
            })
        );
    }

    #[test]
    fn missing_content_is_invalid() {
        for body in [
            r#"{"choices": []}"#,
            r#"{"choices": [{"message": {"content": null}}]}"#,
            "not json",
        ] {
            let err = parse_chat_response(body).unwrap_err();
            assert_eq!(err.reason(), "invalid_response", "{body}");
        }
    }

    #[test]
    fn classifies_error_statuses() {
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED, String::new()).reason(),
            "auth"
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()).reason(),
            "quota"
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY, "down".to_string()).to_string(),
            "backend returned status 502: down"
        );
    }

    #[test]
    fn missing_api_key_fails_before_network() {
        let backend = OpenAiBackend::new("http://127.0.0.1:9/unused", None, "OPENAI_API_KEY");
        let err = backend.complete(&request()).unwrap_err();
        assert_eq!(err.reason(), "missing_api_key");
        assert_eq!(err.to_string(), "OPENAI_API_KEY is not set in environment");
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let backend = OpenAiBackend::new("http://127.0.0.1:9/unused", Some("  ".to_string()), "KEY");
        assert_eq!(backend.complete(&request()).unwrap_err().reason(), "missing_api_key");
    }
}
