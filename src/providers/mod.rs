//! Model endpoint integrations

mod bedrock;
mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::conversation::Turn;

pub use bedrock::BedrockBackend;
pub use client::{CompletionError, InferenceClient};

/// Protocol tag the endpoint expects in every request body
pub const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

/// Error codes the endpoint uses to signal throttling
pub const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
];

/// Error classification for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rate limited / throttled - retryable with backoff
    Throttled,
    /// Endpoint rejected the request (bad input, auth, unknown model)
    Permanent,
    /// No response within the configured timeout
    Timeout,
    /// Connection could not be established or was dropped
    Network,
    /// Response body did not have the expected shape
    InvalidResponse,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled)
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct InferenceError {
    pub kind: ErrorKind,
    pub message: String,
}

impl InferenceError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn throttled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Throttled, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permanent, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidResponse, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<reqwest::Error> for InferenceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::new(ErrorKind::Timeout, format!("Request timeout: {}", e))
        } else if e.is_connect() {
            Self::new(ErrorKind::Network, format!("Connection failed: {}", e))
        } else {
            Self::new(ErrorKind::Network, format!("Request failed: {}", e))
        }
    }
}

/// Request body sent to the model endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvokeRequest {
    pub anthropic_version: String,
    pub system: String,
    pub messages: Vec<Turn>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl InvokeRequest {
    pub fn new(system: &str, messages: &[Turn], max_tokens: u32, temperature: f32) -> Self {
        Self {
            anthropic_version: ANTHROPIC_VERSION.to_string(),
            system: system.to_string(),
            messages: messages.to_vec(),
            max_tokens,
            temperature,
        }
    }
}

/// Response body; the first content block carries the reply
#[derive(Debug, Deserialize)]
pub struct InvokeResponse {
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(default)]
    pub text: Option<String>,
}

impl InvokeResponse {
    pub fn into_text(self) -> Result<String, InferenceError> {
        self.content
            .into_iter()
            .next()
            .and_then(|block| block.text)
            .ok_or_else(|| InferenceError::invalid_response("No text content in response"))
    }
}

/// A single call to a hosted model, without retries
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn invoke(&self, request: &InvokeRequest) -> Result<String, InferenceError>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let request = InvokeRequest::new("Be kind.", &[Turn::user("hi")], 500, 0.7);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["anthropic_version"], "bedrock-2023-05-31");
        assert_eq!(json["system"], "Be kind.");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hi");
        assert_eq!(json["max_tokens"], 500);
    }

    #[test]
    fn test_response_first_block() {
        let body = r#"{"content":[{"type":"text","text":"first"},{"type":"text","text":"second"}]}"#;
        let response: InvokeResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.into_text().unwrap(), "first");
    }

    #[test]
    fn test_empty_content_is_invalid() {
        let response: InvokeResponse = serde_json::from_str(r#"{"content":[]}"#).unwrap();
        let err = response.into_text().unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidResponse);
    }

    #[test]
    fn test_only_throttling_retries() {
        assert!(ErrorKind::Throttled.is_retryable());
        assert!(!ErrorKind::Permanent.is_retryable());
        assert!(!ErrorKind::Timeout.is_retryable());
        assert!(!ErrorKind::Network.is_retryable());
    }
}
