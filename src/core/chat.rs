//! Chat engine: one user message in, one reply out
//!
//! An exchange:
//! 1. Rejects empty input before touching storage or the model
//! 2. Loads the stored conversation (empty if missing or unreadable)
//! 3. Appends the user turn and sends the whole conversation to the model
//! 4. Appends the reply and saves the full conversation back
//! 5. Returns the reply, flagging whether it was persisted

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::conversation::{Conversation, ConversationError, Turn};
use crate::providers::{CompletionError, InferenceClient};
use crate::storage::StorageError;

use super::memory::ConversationStore;
use super::retry::RetryPolicy;

/// Reply sent when a request carries no user text
pub const NO_INPUT_REPLY: &str = "No input received.";

/// Result of a completed exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub reply: String,
    pub persisted: bool,
}

/// Errors from the chat engine
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("No input received.")]
    EmptyInput,

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid conversation: {0}")]
    InvalidHistory(#[from] ConversationError),
}

/// Generation settings shared by every call
#[derive(Debug, Clone)]
struct Generation {
    system_prompt: String,
    max_tokens: u32,
    temperature: f32,
}

/// The core chat engine
#[derive(Clone)]
pub struct ChatEngine {
    store: ConversationStore,
    client: InferenceClient,
    oneshot: InferenceClient,
    generation: Generation,
}

impl ChatEngine {
    pub fn new(
        config: &Config,
        store: ConversationStore,
        client: InferenceClient,
        system_prompt: impl Into<String>,
    ) -> Self {
        let oneshot = client.with_policy(RetryPolicy::new(
            config.retry.oneshot_max_attempts,
            client.policy().initial_delay,
        ));

        Self {
            store,
            client,
            oneshot,
            generation: Generation {
                system_prompt: system_prompt.into(),
                max_tokens: config.inference.max_tokens,
                temperature: config.inference.temperature,
            },
        }
    }

    /// Run one exchange against the conversation stored at `conversation_id`
    pub async fn exchange(
        &self,
        conversation_id: &str,
        user_text: &str,
    ) -> Result<Exchange, ChatError> {
        if user_text.trim().is_empty() {
            return Err(ChatError::EmptyInput);
        }

        let mut conversation = self.store.load(conversation_id).await;
        conversation.push_user(user_text);

        let reply = self
            .client
            .complete(
                &self.generation.system_prompt,
                conversation.turns(),
                self.generation.max_tokens,
                self.generation.temperature,
            )
            .await?;

        conversation.push_assistant(&reply);

        let persisted = match self.store.save(conversation_id, &conversation).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(conversation_id, error = %e, "Error saving conversation");
                false
            }
        };

        Ok(Exchange { reply, persisted })
    }

    /// Single-shot question with no stored history and no follow-up nudge
    pub async fn ask(&self, user_text: &str) -> Result<String, ChatError> {
        if user_text.trim().is_empty() {
            return Err(ChatError::EmptyInput);
        }

        let turns = [Turn::user(user_text)];
        let reply = self
            .oneshot
            .complete_raw(
                &self.generation.system_prompt,
                &turns,
                self.generation.max_tokens,
                self.generation.temperature,
            )
            .await?;

        Ok(reply)
    }

    /// Stored conversation for `conversation_id`
    pub async fn history(&self, conversation_id: &str) -> Conversation {
        self.store.load(conversation_id).await
    }

    /// Replace the stored conversation wholesale (history editing)
    pub async fn replace_history(
        &self,
        conversation_id: &str,
        conversation: &Conversation,
    ) -> Result<(), ChatError> {
        conversation.validate()?;
        self.store.save(conversation_id, conversation).await?;
        tracing::info!(
            conversation_id,
            turns = conversation.len(),
            "Conversation history replaced"
        );
        Ok(())
    }
}
