//! Sales: generic conversational answers, with an optional FAQ assist.
//!
//! Script-driven recommendation continuations are routed directly from the
//! Orchestrator to the ScriptPipeline rather than through this agent —
//! keeping `sa-agents` free of a dependency on `sa-script`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use sa_domain::capability::ModelRole;
use sa_domain::model::{AgentResponse, Intent, Session};
use sa_domain::tool::{Message, MessageContent, Role as MsgRole};
use sa_providers::router::LlmRouter;
use sa_providers::traits::ChatRequest;

use crate::faq::{looks_like_faq, FaqRetriever};
use crate::style_text;
use crate::Agent;

const GENERATION_BUDGET: Duration = Duration::from_secs(10);
const FAQ_TOP_K: usize = 2;

const SYSTEM_PROMPT: &str = "Eres Alex, un asistente de ventas amable y directo. \
    Responde en 1-3 frases, en español, sin inventar precios ni disponibilidad que no te \
    hayan sido dados.";

pub struct SalesAgent {
    router: Arc<LlmRouter>,
    faq: Arc<dyn FaqRetriever>,
}

impl SalesAgent {
    pub fn new(router: Arc<LlmRouter>, faq: Arc<dyn FaqRetriever>) -> Self {
        Self { router, faq }
    }
}

#[async_trait]
impl Agent for SalesAgent {
    fn name(&self) -> &'static str {
        "sales"
    }

    fn can_handle(&self, session: &Session) -> bool {
        matches!(
            session.last_intent,
            Some(Intent::Persuasion) | Some(Intent::Recommendation) | None
        )
    }

    async fn process(&self, session: Session, utterance: &str) -> AgentResponse {
        let mut system = SYSTEM_PROMPT.to_string();

        if looks_like_faq(utterance) {
            if let Ok(passages) = self.faq.retrieve(utterance, FAQ_TOP_K).await {
                if !passages.is_empty() {
                    system.push_str("\nInformación de referencia:\n");
                    system.push_str(&passages.join("\n"));
                }
            }
        }

        let req = ChatRequest {
            messages: vec![
                Message {
                    role: MsgRole::System,
                    content: MessageContent::Text(system),
                },
                Message {
                    role: MsgRole::User,
                    content: MessageContent::Text(utterance.to_string()),
                },
            ],
            temperature: Some(0.7),
            ..Default::default()
        };

        let result = tokio::time::timeout(
            GENERATION_BUDGET,
            self.router.chat_for_role(ModelRole::Generation, req),
        )
        .await;

        match result {
            Ok(Ok(resp)) => AgentResponse::stay("sales", resp.content, session),
            _ => {
                let reply = style_text::generic_apology(session.style);
                AgentResponse::stay("sales", reply, session)
            }
        }
    }
}
