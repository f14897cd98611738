//! Retriever: keyword product search plus FAQ lookups via the external
//! semantic retrieval service.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use sa_catalog::Catalog;
use sa_domain::model::{AgentResponse, Intent, Session};

use crate::faq::{looks_like_faq, strip_answer_prefix, FaqRetriever};
use crate::style_text;
use crate::Agent;

const STOP_WORDS: &[&str] = &[
    "el", "la", "los", "las", "de", "del", "un", "una", "unos", "unas", "con", "para", "por",
    "que", "como", "más", "mas", "sin", "sus", "este", "esta", "estos", "estas", "y", "o",
];
const TRANSFER_THRESHOLD: usize = 5;
const MAX_RESULTS_SHOWN: usize = 10;
const FAQ_TOP_K: usize = 1;

fn tokenize(raw: &str) -> Vec<String> {
    raw.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2 && !STOP_WORDS.contains(t))
        .map(String::from)
        .collect()
}

pub struct RetrieverAgent {
    catalog: Arc<Catalog>,
    faq: Arc<dyn FaqRetriever>,
}

impl RetrieverAgent {
    pub fn new(catalog: Arc<Catalog>, faq: Arc<dyn FaqRetriever>) -> Self {
        Self { catalog, faq }
    }

    async fn process_search(&self, mut session: Session, utterance: &str) -> AgentResponse {
        let tokens = tokenize(utterance);
        if tokens.is_empty() {
            let reply = style_text::search_clarification(session.style);
            return AgentResponse::transfer("retriever", reply, session, "sales");
        }

        let results = match self.catalog.search_by_keywords(utterance).await {
            Ok(r) => r,
            Err(_) => {
                let reply = style_text::search_db_error(session.style);
                return AgentResponse::transfer("retriever", reply, session, "sales");
            }
        };

        let mut seen = HashSet::new();
        let deduped: Vec<_> = results
            .into_iter()
            .filter(|p| p.available > 0 && seen.insert(p.id.clone()))
            .collect();

        if deduped.is_empty() {
            let reply = style_text::no_results(session.style);
            return AgentResponse::transfer("retriever", reply, session, "sales");
        }

        let shown = deduped.iter().take(MAX_RESULTS_SHOWN);
        let mut lines = vec![style_text::search_greeting(session.style)];
        for p in shown {
            let stock_hint = if p.available <= 5 {
                format!(" (quedan {})", p.available)
            } else {
                String::new()
            };
            lines.push(format!("- {}: ${:.2}{}", p.name, p.final_price, stock_hint));
        }
        let reply = lines.join("\n");

        session.last_search_results = deduped.clone();
        session.checkout_candidate_index = 0;

        if deduped.len() <= TRANSFER_THRESHOLD {
            AgentResponse::transfer("retriever", reply, session, "sales")
        } else {
            AgentResponse::stay("retriever", reply, session)
        }
    }

    async fn process_faq(&self, session: Session, utterance: &str) -> AgentResponse {
        let passages = self.faq.retrieve(utterance, FAQ_TOP_K).await;
        match passages {
            Ok(p) if !p.is_empty() => {
                let passage = strip_answer_prefix(&p[0]);
                let reply = style_text::faq_lead_in(session.style, passage);
                AgentResponse::stay("retriever", reply, session)
            }
            _ => {
                let reply = style_text::faq_miss(session.style);
                AgentResponse::transfer("retriever", reply, session, "sales")
            }
        }
    }
}

#[async_trait]
impl Agent for RetrieverAgent {
    fn name(&self) -> &'static str {
        "retriever"
    }

    fn can_handle(&self, session: &Session) -> bool {
        matches!(session.last_intent, Some(Intent::Search) | Some(Intent::Info) | None)
    }

    async fn process(&self, session: Session, utterance: &str) -> AgentResponse {
        if looks_like_faq(utterance) {
            self.process_faq(session, utterance).await
        } else {
            self.process_search(session, utterance).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faq::KeywordFaqStore;
    use sa_domain::model::ProductProjection;
    use std::collections::HashMap;

    fn product(id: &str, name: &str, available: u32) -> ProductProjection {
        ProductProjection {
            id: id.into(),
            name: name.into(),
            barcode: None,
            brand: None,
            category: None,
            unit_price: 10.0,
            final_price: 10.0,
            discount_percent: None,
            promotion_text: None,
            promotion_valid_until: None,
            available,
            active: true,
            location: None,
        }
    }

    async fn catalog_with(products: Vec<ProductProjection>) -> Arc<Catalog> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(
            &path,
            serde_json::to_string(&serde_json::json!({ "products": products })).unwrap(),
        )
        .unwrap();
        Arc::new(Catalog::load_from_file(&path, 5000).unwrap())
    }

    #[tokio::test]
    async fn empty_tokens_ask_clarification_and_transfer() {
        let catalog = catalog_with(vec![]).await;
        let faq = Arc::new(KeywordFaqStore::empty());
        let agent = RetrieverAgent::new(catalog, faq);
        let session = Session::new("s1");
        let response = agent.process(session, "de la el").await;
        assert!(response.should_transfer);
        assert_eq!(response.transfer_to.as_deref(), Some("sales"));
    }

    #[tokio::test]
    async fn search_happy_path_fills_results_and_stays_under_five() {
        let catalog = catalog_with(vec![
            product("p1", "Zapatillas Nike Air", 5),
            product("p2", "Zapatillas Nike Pro", 2),
        ])
        .await;
        let faq = Arc::new(KeywordFaqStore::empty());
        let agent = RetrieverAgent::new(catalog, faq);
        let session = Session::new("s1");
        let response = agent.process(session, "busco Nike").await;
        assert!(response.reply_text.contains("Encontré estos productos:"));
        assert_eq!(response.new_session.last_search_results.len(), 2);
        assert!(response.should_transfer);
    }

    #[tokio::test]
    async fn faq_question_routes_to_faq_lookup() {
        let catalog = catalog_with(vec![]).await;
        let faq = Arc::new(crate::faq::fixture_store(HashMap::from([(
            "horario",
            "Respuesta: abrimos de 9am a 6pm.",
        )])));
        let agent = RetrieverAgent::new(catalog, faq);
        let session = Session::new("s1");
        let response = agent.process(session, "cual es el horario de atencion").await;
        assert!(response.reply_text.contains("9am a 6pm"));
        assert!(!response.should_transfer);
    }
}
