//! Orchestrator (C7): loads/saves session state, classifies each turn,
//! and drives the bounded agent-transfer loop.
//!
//! Sales↔ScriptPipeline coupling lives here rather than inside
//! `SalesAgent`: whenever the turn would route to "sales" and the
//! session carries a live `ScriptSession`, the turn is handed to
//! `ScriptPipeline::continue_conversation` instead. This keeps
//! `sa-agents` free of a dependency on `sa-script`.

use std::collections::HashMap;
use std::sync::Arc;

use sa_agents::{style_text, Agent};
use sa_domain::model::{AgentResponse, Role, Session, Style};
use sa_domain::trace::TraceEvent;
use sa_providers::classifier::{detect_stop_intent, Classifier};
use sa_script::ScriptPipeline;
use sa_sessions::{SessionStore, TranscriptStore};

const MAX_TRANSFERS: u32 = 3;
const STYLE_HISTORY_WINDOW: usize = 5;

pub struct Orchestrator {
    sessions: Arc<SessionStore>,
    transcripts: Arc<TranscriptStore>,
    classifier: Arc<Classifier>,
    retriever: Arc<dyn Agent>,
    sales: Arc<dyn Agent>,
    checkout: Arc<dyn Agent>,
    script_pipeline: Arc<ScriptPipeline>,
}

impl Orchestrator {
    pub fn new(
        sessions: Arc<SessionStore>,
        transcripts: Arc<TranscriptStore>,
        classifier: Arc<Classifier>,
        retriever: Arc<dyn Agent>,
        sales: Arc<dyn Agent>,
        checkout: Arc<dyn Agent>,
        script_pipeline: Arc<ScriptPipeline>,
    ) -> Self {
        Self {
            sessions,
            transcripts,
            classifier,
            retriever,
            sales,
            checkout,
            script_pipeline,
        }
    }

    /// Run one conversational turn end to end: resolve/create the
    /// session, classify, dispatch through the bounded transfer loop,
    /// persist, and return the final reply.
    pub async fn process(
        &self,
        utterance: &str,
        session_id: &str,
        user_id: Option<String>,
    ) -> AgentResponse {
        let (mut session, _is_new) = self.sessions.resolve_or_create(session_id);
        if user_id.is_some() {
            session.user_id = user_id;
        }
        session.recent_utterance = utterance.to_string();
        session.push_history(Role::User, utterance);

        if detect_stop_intent(utterance) {
            let reply = style_text::stop_farewell(session.style);
            return self.finish_turn(session, utterance, reply, None, false, None).await;
        }

        if matches!(session.style, Style::Neutral) {
            let recent: Vec<String> = session
                .history
                .iter()
                .rev()
                .take(STYLE_HISTORY_WINDOW)
                .map(|h| h.text.clone())
                .collect();
            let style_result = self.classifier.detect_style(&session, &recent).await;
            session.style = style_result.style;
        }

        let mut agent_name = if session.checkout_stage.is_some() {
            "checkout".to_string()
        } else {
            let intent_result = self.classifier.classify_intent(&session, utterance).await;
            session.last_intent = Some(intent_result.intent);
            intent_result.suggested_agent
        };
        if !matches!(agent_name.as_str(), "retriever" | "sales" | "checkout") {
            agent_name = "sales".to_string();
        }

        let mut edge_counts: HashMap<String, u32> = HashMap::new();
        let mut transfers = 0u32;
        let mut response = self.dispatch(&agent_name, session, utterance).await;

        loop {
            if !response.should_transfer {
                break;
            }
            let to = response.transfer_to.clone().unwrap_or_else(|| "sales".to_string());
            let edge = format!("{agent_name}->{to}");
            let prior_occurrences = *edge_counts.get(&edge).unwrap_or(&0);
            if transfers >= MAX_TRANSFERS || prior_occurrences >= 2 {
                TraceEvent::TransferLoopBroken {
                    session_id: session_id.to_string(),
                    edge,
                }
                .emit();
                break;
            }
            *edge_counts.entry(edge.clone()).or_insert(0) += 1;
            transfers += 1;
            TraceEvent::AgentTransfer {
                session_id: session_id.to_string(),
                from: agent_name.clone(),
                to: to.clone(),
                turn_transfer_count: transfers,
            }
            .emit();

            agent_name = to;
            let utterance_for_transfer = response.new_session.recent_utterance.clone();
            response = self
                .dispatch(&agent_name, response.new_session, &utterance_for_transfer)
                .await;
        }

        let reply_text = response.reply_text.clone();
        let metadata = response.metadata.clone();
        let agent = response.agent.clone();
        self.finish_turn(response.new_session, utterance, reply_text, Some(agent), false, Some(metadata))
            .await
    }

    async fn dispatch(&self, agent_name: &str, session: Session, utterance: &str) -> AgentResponse {
        if agent_name == "sales" && self.sessions.get_script(&session.session_id).is_some() {
            return self.dispatch_script(session, utterance).await;
        }
        match agent_name {
            "retriever" => self.retriever.process(session, utterance).await,
            "checkout" => self.checkout.process(session, utterance).await,
            _ => self.sales.process(session, utterance).await,
        }
    }

    async fn dispatch_script(&self, session: Session, utterance: &str) -> AgentResponse {
        match self
            .script_pipeline
            .continue_conversation(&session.session_id, utterance)
            .await
        {
            Ok(result) => {
                let mut response = AgentResponse::stay("sales", result.message, session);
                if let Some(order_id) = result.order_id {
                    response
                        .metadata
                        .insert("order_id".into(), serde_json::Value::String(order_id));
                }
                response
            }
            Err(_) => {
                let reply = style_text::generic_apology(session.style);
                AgentResponse::stay("sales", reply, session).with_error("Internal")
            }
        }
    }

    async fn finish_turn(
        &self,
        mut session: Session,
        utterance: &str,
        reply_text: String,
        agent: Option<String>,
        should_transfer: bool,
        metadata: Option<std::collections::HashMap<String, serde_json::Value>>,
    ) -> AgentResponse {
        session.push_history(Role::Agent, &reply_text);

        let _ = self.transcripts.append(
            &session.session_id,
            session.user_id.clone(),
            Role::User,
            utterance.to_string(),
            None,
            None,
        );
        let _ = self.transcripts.append(
            &session.session_id,
            session.user_id.clone(),
            Role::Agent,
            reply_text.clone(),
            None,
            None,
        );
        let _ = self.sessions.save(session.clone(), None);

        let mut response = AgentResponse::stay(agent.unwrap_or_else(|| "orchestrator".to_string()), reply_text, session);
        response.should_transfer = should_transfer;
        if let Some(m) = metadata {
            response.metadata = m;
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_agents::{CheckoutAgent, RetrieverAgent, SalesAgent};
    use sa_catalog::Catalog;
    use sa_domain::config::LlmConfig;
    use sa_orderbook::OrderBook;
    use sa_providers::{LlmRouter, ProviderRegistry};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn build(dir: &std::path::Path) -> Orchestrator {
        let fixture_path = dir.join("catalog.json");
        std::fs::write(
            &fixture_path,
            serde_json::to_string(&serde_json::json!({ "products": [] })).unwrap(),
        )
        .unwrap();
        let catalog = Arc::new(Catalog::load_from_file(&fixture_path, 5000).unwrap());
        let orderbook = Arc::new(OrderBook::new(catalog.clone(), dir).unwrap());
        let sessions = Arc::new(SessionStore::new(dir, 1800).unwrap());
        let transcripts = Arc::new(TranscriptStore::new(&dir.join("transcripts")).unwrap());

        let llm_config = LlmConfig {
            router_mode: sa_domain::config::RouterMode::Capability,
            default_timeout_ms: 20_000,
            require_provider: false,
            startup_policy: Default::default(),
            roles: Default::default(),
            providers: Vec::new(),
        };
        let registry = ProviderRegistry::from_config(&llm_config).unwrap();
        let router = Arc::new(LlmRouter::new(registry, llm_config.roles.clone(), llm_config.default_timeout_ms));

        let classifier = Arc::new(Classifier::new(router.clone()));
        let faq = Arc::new(sa_agents::faq::KeywordFaqStore::empty());
        let retriever = Arc::new(RetrieverAgent::new(catalog.clone(), faq.clone()));
        let sales = Arc::new(SalesAgent::new(router.clone(), faq));
        let checkout = Arc::new(CheckoutAgent::new(orderbook.clone()));
        let tts = Arc::new(sa_script::NullTtsSynthesizer);
        let script_pipeline = Arc::new(ScriptPipeline::new(
            catalog,
            orderbook,
            router,
            sessions.clone(),
            transcripts.clone(),
            tts,
        ));

        Orchestrator::new(sessions, transcripts, classifier, retriever, sales, checkout, script_pipeline)
    }

    #[tokio::test]
    async fn stop_phrase_short_circuits_without_agent_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = build(dir.path());
        let response = orchestrator.process("no gracias, chao", "s1", None).await;
        assert_eq!(response.agent, "orchestrator");
        assert!(!response.reply_text.is_empty());
    }

    #[tokio::test]
    async fn empty_catalog_search_transfers_to_sales() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = build(dir.path());
        let response = orchestrator.process("busco zapatillas", "s2", None).await;
        assert!(!response.reply_text.is_empty());
    }

    /// Always transfers to a fixed agent, counting its own invocations.
    /// Used to force the Sales<->Retriever ping-pong that neither real
    /// agent produces on its own (`SalesAgent` never sets `should_transfer`).
    struct AlwaysTransfer {
        name: &'static str,
        to: &'static str,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Agent for AlwaysTransfer {
        fn name(&self) -> &'static str {
            self.name
        }

        fn can_handle(&self, _session: &Session) -> bool {
            true
        }

        async fn process(&self, session: Session, _utterance: &str) -> AgentResponse {
            self.calls.fetch_add(1, Ordering::SeqCst);
            AgentResponse::transfer(self.name, format!("{} handing off", self.name), session, self.to)
        }
    }

    fn build_with_mutual_transfer(dir: &std::path::Path, calls: Arc<AtomicUsize>) -> Orchestrator {
        let fixture_path = dir.join("catalog.json");
        std::fs::write(
            &fixture_path,
            serde_json::to_string(&serde_json::json!({ "products": [] })).unwrap(),
        )
        .unwrap();
        let catalog = Arc::new(Catalog::load_from_file(&fixture_path, 5000).unwrap());
        let orderbook = Arc::new(OrderBook::new(catalog.clone(), dir).unwrap());
        let sessions = Arc::new(SessionStore::new(dir, 1800).unwrap());
        let transcripts = Arc::new(TranscriptStore::new(&dir.join("transcripts")).unwrap());

        let llm_config = LlmConfig {
            router_mode: sa_domain::config::RouterMode::Capability,
            default_timeout_ms: 20_000,
            require_provider: false,
            startup_policy: Default::default(),
            roles: Default::default(),
            providers: Vec::new(),
        };
        let registry = ProviderRegistry::from_config(&llm_config).unwrap();
        let router = Arc::new(LlmRouter::new(registry, llm_config.roles.clone(), llm_config.default_timeout_ms));
        let classifier = Arc::new(Classifier::new(router.clone()));

        let retriever: Arc<dyn Agent> = Arc::new(AlwaysTransfer {
            name: "retriever",
            to: "sales",
            calls: calls.clone(),
        });
        let sales: Arc<dyn Agent> = Arc::new(AlwaysTransfer {
            name: "sales",
            to: "retriever",
            calls: calls.clone(),
        });
        let checkout: Arc<dyn Agent> = Arc::new(CheckoutAgent::new(orderbook.clone()));
        let tts = Arc::new(sa_script::NullTtsSynthesizer);
        let script_pipeline = Arc::new(ScriptPipeline::new(
            catalog,
            orderbook,
            router,
            sessions.clone(),
            transcripts.clone(),
            tts,
        ));

        Orchestrator::new(sessions, transcripts, classifier, retriever, sales, checkout, script_pipeline)
    }

    #[tokio::test]
    async fn mutual_transfer_loop_is_bounded_and_breaks_on_repeated_edge() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let orchestrator = build_with_mutual_transfer(dir.path(), calls.clone());

        // "busco zapatillas" keyword-classifies to Search -> "retriever",
        // which always transfers to "sales", which always transfers back.
        // Edges: retriever->sales, sales->retriever, retriever->sales,
        // broken on the third occurrence attempt (sales->retriever would
        // be its third), so transfers stop at MAX_TRANSFERS == 3.
        let response = orchestrator.process("busco zapatillas", "s3", None).await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(response.agent, "sales");
        assert!(!response.reply_text.is_empty());
    }
}
