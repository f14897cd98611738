//! Conversation state: the fast TTL'd [`store::SessionStore`] and the
//! durable append-only [`transcript::TranscriptStore`].

pub mod store;
pub mod transcript;

pub use store::SessionStore;
pub use transcript::{ConversationSummary, TranscriptStore};
