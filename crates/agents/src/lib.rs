//! The three conversational agents: Retriever, Sales, Checkout.
//!
//! Each agent implements the same advisory `can_handle` + authoritative
//! `process` contract. Routing is owned by the Orchestrator; `can_handle`
//! exists only so callers can sanity-check a hand-off before committing to
//! it, the way the teacher's tool-call capability checks gate a dispatch
//! before it runs.

pub mod checkout;
pub mod faq;
pub mod retriever;
pub mod sales;
pub mod style_text;

use async_trait::async_trait;
use sa_domain::model::{AgentResponse, Session};

#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &'static str;

    /// Advisory: whether this agent is a sensible fit for the session's
    /// current state. Routing decisions do not depend on this returning
    /// `true` — the Orchestrator is authoritative.
    fn can_handle(&self, session: &Session) -> bool;

    async fn process(&self, session: Session, utterance: &str) -> AgentResponse;
}

pub use checkout::CheckoutAgent;
pub use retriever::RetrieverAgent;
pub use sales::SalesAgent;
