//! Retry-wrapped completion client

use std::sync::Arc;
use thiserror::Error;

use crate::conversation::Turn;
use crate::core::{RetryError, RetryPolicy};

use super::{ErrorKind, InferenceError, InvokeRequest, ModelBackend};

/// Appended to replies that do not already end with a question
pub const CONTINUATION_PROMPT: &str = " Would you like to talk more about that?";

#[derive(Debug, Error)]
pub enum CompletionError {
    /// The endpoint kept throttling for the whole attempt budget
    #[error("Max retries exceeded after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: InferenceError },

    /// The endpoint rejected the request outright
    #[error("{0}")]
    Inference(InferenceError),
}

impl CompletionError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::RetriesExhausted { .. } => None,
            Self::Inference(e) => Some(e.kind),
        }
    }
}

impl From<RetryError<InferenceError>> for CompletionError {
    fn from(e: RetryError<InferenceError>) -> Self {
        match e {
            RetryError::Exhausted { attempts, last } => Self::RetriesExhausted { attempts, last },
            RetryError::Fatal(e) => Self::Inference(e),
        }
    }
}

/// Sends conversations to a model backend, retrying throttled calls
#[derive(Clone)]
pub struct InferenceClient {
    backend: Arc<dyn ModelBackend>,
    policy: RetryPolicy,
}

impl InferenceClient {
    pub fn new(backend: Arc<dyn ModelBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    /// Same backend, different attempt budget
    pub fn with_policy(&self, policy: RetryPolicy) -> Self {
        Self {
            backend: self.backend.clone(),
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Generate a reply and nudge the user to keep talking when it does not end in a question
    pub async fn complete(
        &self,
        system_prompt: &str,
        turns: &[Turn],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, CompletionError> {
        let reply = self
            .complete_raw(system_prompt, turns, max_tokens, temperature)
            .await?;
        Ok(with_continuation(reply))
    }

    /// Generate a reply without post-processing
    pub async fn complete_raw(
        &self,
        system_prompt: &str,
        turns: &[Turn],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, CompletionError> {
        let request = InvokeRequest::new(system_prompt, turns, max_tokens, temperature);
        let backend = &self.backend;
        let request = &request;

        let reply = self
            .policy
            .run(
                |attempt| async move {
                    tracing::debug!(attempt, turns = request.messages.len(), "Invoking model");
                    backend.invoke(request).await
                },
                InferenceError::is_retryable,
            )
            .await?;

        Ok(reply)
    }
}

/// Append the continuation prompt unless the reply already asks a question
pub fn with_continuation(mut reply: String) -> String {
    if !reply.trim_end().ends_with('?') {
        reply.push_str(CONTINUATION_PROMPT);
    }
    reply
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::ScriptedBackend;
    use std::time::Duration;

    fn client(backend: Arc<ScriptedBackend>, attempts: u32) -> InferenceClient {
        InferenceClient::new(backend, RetryPolicy::new(attempts, Duration::from_secs(5)))
    }

    #[test]
    fn test_continuation_added() {
        assert_eq!(
            with_continuation("Try a five-minute timer.".to_string()),
            "Try a five-minute timer. Would you like to talk more about that?"
        );
    }

    #[test]
    fn test_question_left_alone() {
        assert_eq!(
            with_continuation("How did that feel?".to_string()),
            "How did that feel?"
        );
        assert_eq!(
            with_continuation("How did that feel?  \n".to_string()),
            "How did that feel?  \n"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_retries_then_nudges() {
        let backend = Arc::new(ScriptedBackend::throttled_then(2, "Try a five-minute timer."));
        let client = client(backend.clone(), 10);

        let reply = client
            .complete("system", &[Turn::user("I can't start tasks")], 500, 0.7)
            .await
            .unwrap();

        assert_eq!(
            reply,
            "Try a five-minute timer. Would you like to talk more about that?"
        );
        assert_eq!(backend.calls(), 3);

        let requests = backend.requests.lock().unwrap();
        assert!(requests.iter().all(|r| r == &requests[0]));
        assert_eq!(requests[0].system, "system");
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_is_distinct() {
        let backend = Arc::new(ScriptedBackend::default());
        let client = client(backend.clone(), 5);

        let err = client
            .complete("system", &[Turn::user("hello")], 500, 0.7)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CompletionError::RetriesExhausted { attempts: 5, .. }
        ));
        assert_eq!(backend.calls(), 5);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err(InferenceError::permanent(
            "AccessDeniedException: no access",
        ))]));
        let client = client(backend.clone(), 10);

        let err = client
            .complete("system", &[Turn::user("hello")], 500, 0.7)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Some(ErrorKind::Permanent));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_raw_skips_nudge() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok("Breathe.".to_string())]));
        let client = client(backend, 5);

        let reply = client
            .complete_raw("system", &[Turn::user("hello")], 500, 0.7)
            .await
            .unwrap();

        assert_eq!(reply, "Breathe.");
    }
}
