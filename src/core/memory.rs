//! Conversation persistence on top of a document store
//!
//! Reads never fail: a missing or unreadable log starts the conversation over.
//! Writes replace the whole log and report failures to the caller.

use std::sync::Arc;

use crate::conversation::Conversation;
use crate::storage::{DocumentStore, StorageError};

#[derive(Clone)]
pub struct ConversationStore {
    backend: Arc<dyn DocumentStore>,
}

impl ConversationStore {
    pub fn new(backend: Arc<dyn DocumentStore>) -> Self {
        Self { backend }
    }

    /// Load the conversation stored at `conversation_id`, or an empty one
    pub async fn load(&self, conversation_id: &str) -> Conversation {
        let bytes = match self.backend.get(conversation_id).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::debug!(conversation_id, "No stored conversation, starting fresh");
                return Conversation::new();
            }
            Err(e) => {
                tracing::warn!(
                    conversation_id,
                    backend = self.backend.name(),
                    error = %e,
                    "Error loading conversation, starting fresh"
                );
                return Conversation::new();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(conversation) => conversation,
            Err(e) => {
                tracing::warn!(
                    conversation_id,
                    backend = self.backend.name(),
                    error = %e,
                    "Stored conversation is unreadable, starting fresh"
                );
                Conversation::new()
            }
        }
    }

    /// Overwrite the stored conversation with `conversation`
    pub async fn save(
        &self,
        conversation_id: &str,
        conversation: &Conversation,
    ) -> Result<(), StorageError> {
        let body = serde_json::to_vec_pretty(conversation)?;

        self.backend.put(conversation_id, body).await?;

        tracing::debug!(
            conversation_id,
            backend = self.backend.name(),
            turns = conversation.len(),
            "Conversation saved"
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory document stores for exercising persistence paths

    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::storage::{DocumentStore, StorageError};

    #[derive(Default)]
    pub struct MemoryDocuments {
        pub docs: Mutex<HashMap<String, Vec<u8>>>,
        pub fail_reads: bool,
        pub fail_writes: bool,
    }

    impl MemoryDocuments {
        pub fn with_doc(key: &str, body: &[u8]) -> Self {
            let store = Self::default();
            store
                .docs
                .lock()
                .unwrap()
                .insert(key.to_string(), body.to_vec());
            store
        }
    }

    #[async_trait]
    impl DocumentStore for MemoryDocuments {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
            if self.fail_reads {
                return Err(StorageError::Status {
                    status: 503,
                    body: "SlowDown".to_string(),
                });
            }
            Ok(self.docs.lock().unwrap().get(key).cloned())
        }

        async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError> {
            if self.fail_writes {
                return Err(StorageError::Status {
                    status: 403,
                    body: "AccessDenied".to_string(),
                });
            }
            self.docs.lock().unwrap().insert(key.to_string(), body);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "memory"
        }
    }
}
