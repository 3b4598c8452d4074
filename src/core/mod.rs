//! Core relay components
//!
//! Conversation persistence, the retry policy, and the exchange pipeline that
//! ties them to the model client.

mod chat;
mod memory;
mod retry;

pub use chat::{ChatEngine, ChatError, NO_INPUT_REPLY};
pub use memory::ConversationStore;
pub use retry::{RetryError, RetryPolicy};

#[cfg(test)]
pub(crate) use chat::testing;
#[cfg(test)]
pub(crate) use memory::testing as memory_testing;
