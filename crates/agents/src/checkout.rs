//! Checkout: staged conversational purchase flow driven by `checkout_stage`.

use std::sync::Arc;

use async_trait::async_trait;

use sa_domain::error::Error;
use sa_domain::model::{AgentResponse, CheckoutStage, Intent, ProductProjection, Session};
use sa_orderbook::{OrderBook, OrderLineRequest};

use crate::style_text::{self, is_affirmative, is_negative};
use crate::Agent;

const MIN_SIZE: u32 = 35;
const MAX_SIZE: u32 = 50;

pub struct CheckoutAgent {
    orderbook: Arc<OrderBook>,
}

impl CheckoutAgent {
    pub fn new(orderbook: Arc<OrderBook>) -> Self {
        Self { orderbook }
    }

    fn current_candidate(session: &Session) -> Option<&ProductProjection> {
        session.last_search_results.get(session.checkout_candidate_index)
    }

    fn enter_confirm(&self, mut session: Session) -> AgentResponse {
        match Self::current_candidate(&session).cloned() {
            Some(product) => {
                session.checkout_stage = Some(CheckoutStage::Confirm);
                let reply = style_text::checkout_confirm_prompt(
                    session.style,
                    &product.name,
                    product.final_price,
                );
                AgentResponse::stay("checkout", reply, session)
            }
            None => {
                session.checkout_stage = None;
                let reply = style_text::checkout_ask_alternative(session.style);
                AgentResponse::transfer("checkout", reply, session, "retriever")
            }
        }
    }

    fn handle_confirm(&self, mut session: Session, utterance: &str) -> AgentResponse {
        if is_affirmative(utterance) {
            session.checkout_stage = Some(CheckoutStage::Address);
            let reply = style_text::checkout_address_request(session.style);
            return AgentResponse::stay("checkout", reply, session);
        }

        if is_negative(utterance) {
            if session.checkout_candidate_index + 1 < session.last_search_results.len() {
                session.checkout_candidate_index += 1;
                return self.enter_confirm(session);
            }
            session.checkout_stage = None;
            let reply = style_text::checkout_ask_alternative(session.style);
            return AgentResponse::transfer("checkout", reply, session, "retriever");
        }

        // Neither affirmative nor negative: re-ask.
        let product = Self::current_candidate(&session).cloned();
        let reply = match product {
            Some(p) => style_text::checkout_confirm_prompt(session.style, &p.name, p.final_price),
            None => style_text::checkout_ask_alternative(session.style),
        };
        AgentResponse::stay("checkout", reply, session)
    }

    async fn handle_address(&self, mut session: Session, utterance: &str) -> AgentResponse {
        let parsed = parse_size_and_address(utterance);
        let (size, address) = match parsed {
            Some(pair) => pair,
            None => {
                let reply = style_text::checkout_address_parse_error(session.style);
                return AgentResponse::stay("checkout", reply, session);
            }
        };

        let product = match Self::current_candidate(&session).cloned() {
            Some(p) => p,
            None => {
                session.checkout_stage = None;
                let reply = style_text::checkout_ask_alternative(session.style);
                return AgentResponse::transfer("checkout", reply, session, "retriever");
            }
        };

        let user_id = session.user_id.clone().unwrap_or_else(|| "guest".to_string());
        let result = self.orderbook.create_order(
            &user_id,
            &[OrderLineRequest {
                product_id: product.id.clone(),
                quantity: 1,
            }],
            address,
            Some(format!("Size: {size}")),
            Some(session.session_id.clone()),
        );

        match result {
            Ok(order) => {
                session.checkout_stage = Some(CheckoutStage::Complete);
                session.clear_cart();
                let reply = style_text::checkout_order_confirmation(
                    session.style,
                    &order.order_number(),
                    order.total,
                );
                let mut response = AgentResponse::stay("checkout", reply, session);
                response
                    .metadata
                    .insert("order_id".into(), serde_json::Value::String(order.id));
                response
            }
            Err(Error::Conflict(_)) | Err(Error::NotFound(_)) => {
                session.checkout_stage = Some(CheckoutStage::Confirm);
                let reply = style_text::checkout_insufficient_stock(session.style);
                AgentResponse::stay("checkout", reply, session).with_error("InsufficientStock")
            }
            Err(_) => {
                let reply = style_text::checkout_retry(session.style);
                AgentResponse::stay("checkout", reply, session).with_error("StorageError")
            }
        }
    }
}

/// Extract an integer size in `[35, 50]` and treat the remaining text
/// (with that token removed) as the address. Returns `None` when no
/// size-looking integer is found or the remainder is empty.
fn parse_size_and_address(text: &str) -> Option<(u32, String)> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let idx = tokens
        .iter()
        .position(|t| matches!(t.parse::<u32>(), Ok(n) if (MIN_SIZE..=MAX_SIZE).contains(&n)))?;
    let size: u32 = tokens[idx].parse().ok()?;

    let remainder: String = tokens
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != idx)
        .map(|(_, t)| *t)
        .collect::<Vec<_>>()
        .join(" ");
    let remainder = remainder.trim().to_string();

    if remainder.is_empty() {
        None
    } else {
        Some((size, remainder))
    }
}

#[async_trait]
impl Agent for CheckoutAgent {
    fn name(&self) -> &'static str {
        "checkout"
    }

    fn can_handle(&self, session: &Session) -> bool {
        matches!(session.last_intent, Some(Intent::Checkout)) || session.checkout_stage.is_some()
    }

    async fn process(&self, session: Session, utterance: &str) -> AgentResponse {
        match session.checkout_stage {
            None => self.enter_confirm(session),
            Some(CheckoutStage::Confirm) => self.handle_confirm(session, utterance),
            Some(CheckoutStage::Address) => self.handle_address(session, utterance).await,
            Some(CheckoutStage::Payment) | Some(CheckoutStage::Complete) => {
                self.enter_confirm(session)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_catalog::Catalog;

    fn product(id: &str, name: &str, final_price: f64, available: u32) -> ProductProjection {
        ProductProjection {
            id: id.into(),
            name: name.into(),
            barcode: Some(format!("BC-{id}")),
            brand: None,
            category: None,
            unit_price: final_price,
            final_price,
            discount_percent: None,
            promotion_text: None,
            promotion_valid_until: None,
            available,
            active: true,
            location: None,
        }
    }

    fn setup() -> (CheckoutAgent, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let fixture_path = dir.path().join("catalog.json");
        let products = vec![product("p1", "Zapatillas", 50.0, 5)];
        std::fs::write(
            &fixture_path,
            serde_json::to_string(&serde_json::json!({ "products": products })).unwrap(),
        )
        .unwrap();
        let catalog = Arc::new(Catalog::load_from_file(&fixture_path, 5000).unwrap());
        let orderbook = Arc::new(OrderBook::new(catalog, dir.path()).unwrap());
        (CheckoutAgent::new(orderbook), dir)
    }

    fn session_with_candidate() -> Session {
        let mut session = Session::new("s1");
        session.user_id = Some("u1".into());
        session.last_search_results = vec![product("p1", "Zapatillas", 50.0, 5)];
        session
    }

    #[tokio::test]
    async fn null_stage_enters_confirm() {
        let (agent, _dir) = setup();
        let response = agent.process(session_with_candidate(), "").await;
        assert_eq!(response.new_session.checkout_stage, Some(CheckoutStage::Confirm));
        assert!(response.reply_text.contains("Zapatillas"));
    }

    #[tokio::test]
    async fn confirm_affirmative_advances_to_address() {
        let (agent, _dir) = setup();
        let mut session = session_with_candidate();
        session.checkout_stage = Some(CheckoutStage::Confirm);
        let response = agent.process(session, "si").await;
        assert_eq!(response.new_session.checkout_stage, Some(CheckoutStage::Address));
    }

    #[tokio::test]
    async fn address_with_valid_size_creates_order() {
        let (agent, _dir) = setup();
        let mut session = session_with_candidate();
        session.checkout_stage = Some(CheckoutStage::Address);
        let response = agent.process(session, "talla 42 Av Loja 456 Cuenca").await;
        assert_eq!(response.new_session.checkout_stage, Some(CheckoutStage::Complete));
        assert!(response.reply_text.contains("ORD-"));
        assert!(response.new_session.cart.is_empty());
    }

    #[tokio::test]
    async fn address_without_size_reasks() {
        let (agent, _dir) = setup();
        let mut session = session_with_candidate();
        session.checkout_stage = Some(CheckoutStage::Address);
        let response = agent.process(session, "Av Loja 456 Cuenca").await;
        assert_eq!(response.new_session.checkout_stage, Some(CheckoutStage::Address));
    }

    #[test]
    fn parse_size_and_address_extracts_in_range_token() {
        let (size, address) = parse_size_and_address("talla 42 Av Loja 456 Cuenca").unwrap();
        assert_eq!(size, 42);
        assert_eq!(address, "talla Av Loja 456 Cuenca");
    }

    #[test]
    fn parse_size_and_address_rejects_out_of_range() {
        assert!(parse_size_and_address("60 Av Loja").is_none());
    }
}
