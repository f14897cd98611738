//! ScriptPipeline: turns an externally-supplied structured product brief
//! into a ranked recommendation, then drives the confirm/ship/order
//! continuation across subsequent turns.

use std::sync::Arc;
use std::time::Duration;

use sa_agents::style_text::{is_affirmative, is_negative};
use sa_catalog::Catalog;
use sa_domain::capability::ModelRole;
use sa_domain::error::{Error, Result};
use sa_domain::model::{
    NextStep, OrderStatus, PrimaryIntent, ProductProjection, Role, Script, ScriptSession, Style,
};
use sa_domain::tool::{Message, MessageContent, Role as MsgRole};
use sa_domain::trace::TraceEvent;
use sa_orderbook::{OrderBook, OrderLineRequest};
use sa_providers::router::LlmRouter;
use sa_providers::traits::ChatRequest;
use sa_sessions::{SessionStore, TranscriptStore};

use crate::comparator::{self, RankResult};
use crate::tts::TtsSynthesizer;

const GENERATION_BUDGET: Duration = Duration::from_secs(10);
const SCRIPT_TTL_MINUTES: i64 = 30;
const MIN_SIZE: u32 = 35;
const MAX_SIZE: u32 = 50;

pub struct ScriptResult {
    pub ok: bool,
    pub short_reply: String,
    pub ranked_list: Vec<ProductProjection>,
    pub best_id: String,
    pub reasoning: String,
    pub next_step: NextStep,
    pub audio: Option<String>,
}

pub struct ContinueResult {
    pub ok: bool,
    pub message: String,
    pub best_id: Option<String>,
    pub next_step: NextStep,
    pub order_id: Option<String>,
    pub order_number: Option<String>,
    pub order_total: Option<f64>,
    pub order_status: Option<OrderStatus>,
    pub audio: Option<String>,
}

pub struct ScriptPipeline {
    catalog: Arc<Catalog>,
    orderbook: Arc<OrderBook>,
    router: Arc<LlmRouter>,
    sessions: Arc<SessionStore>,
    transcripts: Arc<TranscriptStore>,
    tts: Arc<dyn TtsSynthesizer>,
}

impl ScriptPipeline {
    pub fn new(
        catalog: Arc<Catalog>,
        orderbook: Arc<OrderBook>,
        router: Arc<LlmRouter>,
        sessions: Arc<SessionStore>,
        transcripts: Arc<TranscriptStore>,
        tts: Arc<dyn TtsSynthesizer>,
    ) -> Self {
        Self {
            catalog,
            orderbook,
            router,
            sessions,
            transcripts,
            tts,
        }
    }

    pub async fn process_script(&self, script: Script) -> Result<ScriptResult> {
        let barcodes: Vec<String> = script.products.iter().map(|p| p.barcode.clone()).collect();
        if barcodes.is_empty() {
            let reply = "No recibí códigos de producto válidos para buscar.".to_string();
            return Ok(no_match_result(reply));
        }

        let projections = self.catalog.get_by_barcodes(&barcodes).await?;
        if projections.is_empty() {
            let missing = barcodes.join(", ");
            let reply = format!("No encontré productos para los códigos: {missing}.");
            return Ok(no_match_result(reply));
        }

        let RankResult {
            ranked,
            best_id,
            reasoning,
        } = comparator::rank(projections, &script);

        let best = ranked.first().expect("ranked is non-empty after the emptiness check above");

        let persuasive = self.generate_persuasive_message(&script, best.product.clone()).await;
        let full_message = build_full_message(&persuasive, &ranked, &script);

        let session = ScriptSession {
            session_id: script.session_id.clone(),
            ranked: ranked.iter().map(|s| s.product.clone()).collect(),
            chosen_index: 0,
            style: script.preferences.style,
            approved: false,
            shipping_info: None,
            order_id: None,
            created_at: chrono::Utc::now(),
        };
        self.sessions
            .save_script(session, Some(chrono::Duration::minutes(SCRIPT_TTL_MINUTES)))?;

        self.transcripts.append(
            &script.session_id,
            None,
            Role::User,
            script.original_text.clone(),
            None,
            None,
        )?;
        self.transcripts.append(
            &script.session_id,
            None,
            Role::Agent,
            full_message.clone(),
            None,
            None,
        )?;

        let audio = self.tts.synthesize(&full_message).await.unwrap_or(None);

        TraceEvent::ScriptProcessed {
            session_id: script.session_id.clone(),
            product_count: ranked.len(),
            best_id: best_id.clone(),
        }
        .emit();

        let next_step = match script.context.primary_intent {
            PrimaryIntent::Buy => NextStep::ConfirmBuy,
            _ => NextStep::MoreInfo,
        };

        Ok(ScriptResult {
            ok: true,
            short_reply: full_message,
            ranked_list: ranked.into_iter().map(|s| s.product).collect(),
            best_id,
            reasoning,
            next_step,
            audio,
        })
    }

    pub async fn continue_conversation(
        &self,
        session_id: &str,
        user_text: &str,
    ) -> Result<ContinueResult> {
        let Some(mut script_session) = self.sessions.get_script(session_id) else {
            let message =
                "Esa recomendación ya expiró. Cuéntame de nuevo qué estás buscando.".to_string();
            return Ok(self.finish_continue(session_id, user_text, message, None, NextStep::Retry, None).await);
        };

        if is_affirmative(user_text) {
            script_session.approved = true;
            self.sessions
                .save_script(script_session.clone(), Some(chrono::Duration::minutes(SCRIPT_TTL_MINUTES)))?;
            let message = style_ask_shipping(script_session.style);
            return Ok(self
                .finish_continue(
                    session_id,
                    user_text,
                    message,
                    script_session.best().map(|p| p.id.clone()),
                    NextStep::NeedShipping,
                    None,
                )
                .await);
        }

        if is_negative(user_text) {
            if script_session.advance() {
                self.sessions
                    .save_script(script_session.clone(), Some(chrono::Duration::minutes(SCRIPT_TTL_MINUTES)))?;
                let next = script_session.best().expect("advance() succeeded");
                let message = format!(
                    "Entendido, probemos con {} a ${:.2} en su lugar.",
                    next.name, next.final_price
                );
                return Ok(self
                    .finish_continue(
                        session_id,
                        user_text,
                        message,
                        Some(next.id.clone()),
                        NextStep::ConfirmBuy,
                        None,
                    )
                    .await);
            }
            self.sessions.delete_script(session_id)?;
            let message = "No tengo más alternativas para esa búsqueda. Cuéntame de nuevo qué necesitas."
                .to_string();
            return Ok(self.finish_continue(session_id, user_text, message, None, NextStep::Retry, None).await);
        }

        if let Some((size, address)) = parse_size_and_address(user_text) {
            return Ok(self
                .complete_order(session_id, user_text, script_session, size, address)
                .await);
        }

        let message = "Para avanzar dime si confirmas la compra, o dame tu talla y dirección de envío."
            .to_string();
        Ok(self.finish_continue(session_id, user_text, message, script_session.best().map(|p| p.id.clone()), NextStep::MoreInfo, None).await)
    }

    async fn complete_order(
        &self,
        session_id: &str,
        user_text: &str,
        script_session: ScriptSession,
        size: u32,
        address: String,
    ) -> ContinueResult {
        let Some(product) = script_session.best().cloned() else {
            let message = "Ya no tengo un producto seleccionado. Empecemos de nuevo.".to_string();
            return self.finish_continue(session_id, user_text, message, None, NextStep::Retry, None).await;
        };

        let result = self.orderbook.create_order(
            "guest",
            &[OrderLineRequest {
                product_id: product.id.clone(),
                quantity: 1,
            }],
            address,
            Some(format!("Size: {size}")),
            Some(session_id.to_string()),
        );

        match result {
            Ok(order) => {
                let _ = self.sessions.delete_script(session_id);
                let message = format!(
                    "Listo, tu pedido {} por ${:.2} fue confirmado.",
                    order.order_number(),
                    order.total
                );
                ContinueResult {
                    ok: true,
                    message: message.clone(),
                    best_id: Some(product.id.clone()),
                    next_step: NextStep::OrderCompleted,
                    order_id: Some(order.id.clone()),
                    order_number: Some(order.order_number()),
                    order_total: Some(order.total),
                    order_status: Some(order.status),
                    audio: self.synthesize_and_log(session_id, user_text, &message).await,
                }
            }
            Err(Error::Conflict(_)) | Err(Error::NotFound(_)) => {
                let message = format!(
                    "Justo se agotó el stock de {}. ¿Quieres que busque una alternativa?",
                    product.name
                );
                self.finish_continue(session_id, user_text, message, Some(product.id), NextStep::Retry, None).await
            }
            Err(_) => {
                let message = "Tuve un problema guardando tu pedido, intentemos de nuevo.".to_string();
                self.finish_continue(session_id, user_text, message, Some(product.id), NextStep::Retry, None).await
            }
        }
    }

    async fn finish_continue(
        &self,
        session_id: &str,
        user_text: &str,
        message: String,
        best_id: Option<String>,
        next_step: NextStep,
        order: Option<(String, String, f64, OrderStatus)>,
    ) -> ContinueResult {
        let audio = self.synthesize_and_log(session_id, user_text, &message).await;
        let (order_id, order_number, order_total, order_status) = match order {
            Some((id, number, total, status)) => (Some(id), Some(number), Some(total), Some(status)),
            None => (None, None, None, None),
        };
        ContinueResult {
            ok: true,
            message,
            best_id,
            next_step,
            order_id,
            order_number,
            order_total,
            order_status,
            audio,
        }
    }

    async fn synthesize_and_log(&self, session_id: &str, user_text: &str, message: &str) -> Option<String> {
        let _ = self.transcripts.append(session_id, None, Role::User, user_text.to_string(), None, None);
        let _ = self.transcripts.append(session_id, None, Role::Agent, message.to_string(), None, None);
        self.tts.synthesize(message).await.unwrap_or(None)
    }

    async fn generate_persuasive_message(&self, script: &Script, best: ProductProjection) -> String {
        let system = persuasive_system_prompt(script.preferences.style);
        let user = format!(
            "Producto recomendado: {} a ${:.2}. Texto original del cliente: {}",
            best.name, best.final_price, script.original_text
        );

        let req = ChatRequest {
            messages: vec![
                Message {
                    role: MsgRole::System,
                    content: MessageContent::Text(system),
                },
                Message {
                    role: MsgRole::User,
                    content: MessageContent::Text(user),
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
            Ok(Ok(resp)) => resp.content,
            _ => deterministic_persuasive_fallback(&best),
        }
    }
}

fn no_match_result(reply: String) -> ScriptResult {
    ScriptResult {
        ok: false,
        short_reply: reply,
        ranked_list: Vec::new(),
        best_id: String::new(),
        reasoning: String::new(),
        next_step: NextStep::Retry,
        audio: None,
    }
}

fn persuasive_system_prompt(style: Style) -> String {
    let tone = match style {
        Style::Cuencano => "con acento y modismos cuencanos, cercano",
        Style::Juvenil => "juvenil, directo, con energía",
        Style::Formal => "formal y profesional",
        Style::Neutral => "neutral y claro",
    };
    format!(
        "Eres un vendedor {tone}. Convence al cliente del producto recomendado en 1-2 frases, \
        sin inventar precios ni stock distintos a los que se te dan."
    )
}

fn deterministic_persuasive_fallback(best: &ProductProjection) -> String {
    match best.discount_percent {
        Some(pct) => format!(
            "Te recomiendo {} a ${:.2}, con un {:.0}% de descuento. ¿Te lo reservo?",
            best.name, best.final_price, pct
        ),
        None => format!(
            "Te recomiendo {} a ${:.2}. ¿Te lo reservo?",
            best.name, best.final_price
        ),
    }
}

fn style_ask_shipping(style: Style) -> String {
    match style {
        Style::Cuencano => "De una pues, decime tu talla y la dirección para el envío.".to_string(),
        Style::Juvenil => "Dale, pásame tu talla y tu dirección para enviarlo.".to_string(),
        Style::Formal => "Perfecto. Indíqueme su talla y la dirección de envío, por favor.".to_string(),
        Style::Neutral => "Bien, dime tu talla y la dirección de envío.".to_string(),
    }
}

fn build_full_message(persuasive: &str, ranked: &[comparator::ScoredProduct], script: &Script) -> String {
    let mut out = persuasive.to_string();
    out.push_str("\n\n");

    for (i, scored) in ranked.iter().enumerate() {
        let marker = if i == 0 { "★" } else { "-" };
        let price_text = match scored.product.discount_percent {
            Some(pct) => format!(
                "~~${:.2}~~ ${:.2} (-{:.0}%)",
                scored.product.unit_price, scored.product.final_price, pct
            ),
            None => format!("${:.2}", scored.product.final_price),
        };
        out.push_str(&format!("{marker} {} — {price_text}", scored.product.name));
        if scored.product.available <= 5 && scored.product.available > 0 {
            out.push_str(&format!(" (quedan {})", scored.product.available));
        }
        out.push('\n');
    }

    if matches!(script.context.primary_intent, PrimaryIntent::Buy | PrimaryIntent::Recommend) {
        out.push_str("\n¿Confirmas la compra?");
    }

    out
}

/// Extract an integer size in `[35, 50]` and treat the remaining text as
/// the address, mirroring the Checkout agent's parsing convention.
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

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::model::{InputKind, Priority, ScriptContext, ScriptPreferences, ScriptProduct};
    use tempfile::tempdir;

    fn sample_products() -> Vec<ProductProjection> {
        vec![ProductProjection {
            id: "p-1".into(),
            name: "Zapatillas".into(),
            barcode: Some("111".into()),
            brand: None,
            category: Some("running".into()),
            unit_price: 100.0,
            final_price: 100.0,
            discount_percent: None,
            promotion_text: None,
            promotion_valid_until: None,
            available: 8,
            active: true,
            location: None,
        }]
    }

    fn sample_script() -> Script {
        Script {
            session_id: "s1".into(),
            products: vec![ScriptProduct {
                barcode: "111".into(),
                detected_name: "zapatillas".into(),
                brand: None,
                category: None,
                priority: Priority::Alta,
                reason_text: "".into(),
            }],
            preferences: ScriptPreferences {
                style: Style::Neutral,
                intended_use: None,
                activity_level: None,
                preferred_size: None,
                preferred_color: None,
                budget_max: None,
                wants_promos: true,
                urgency: Priority::Media,
                important_features: vec![],
            },
            context: ScriptContext {
                input_kind: InputKind::Text,
                explicit_product: None,
                needs_recommendation: true,
                primary_intent: PrimaryIntent::Buy,
                extra_constraints: vec![],
            },
            original_text: "quiero unas zapatillas para correr".into(),
            summary: "busca zapatillas".into(),
            confidence: 0.9,
        }
    }

    #[test]
    fn empty_barcodes_short_circuit_to_no_match() {
        let result = no_match_result("sin codigos".into());
        assert!(!result.ok);
        assert!(result.ranked_list.is_empty());
    }

    #[test]
    fn parse_size_and_address_extracts_in_range_token() {
        let (size, address) = parse_size_and_address("talla 40 Calle Larga 123").unwrap();
        assert_eq!(size, 40);
        assert_eq!(address, "talla Calle Larga 123");
    }

    #[test]
    fn deterministic_fallback_includes_discount() {
        let mut product = sample_products().remove(0);
        product.discount_percent = Some(10.0);
        let message = deterministic_persuasive_fallback(&product);
        assert!(message.contains("10%"));
    }

    #[tokio::test]
    async fn continue_conversation_without_session_asks_to_restart() {
        let dir = tempdir().unwrap();
        let fixture_path = dir.path().join("catalog.json");
        std::fs::write(
            &fixture_path,
            serde_json::to_string(&serde_json::json!({ "products": sample_products() })).unwrap(),
        )
        .unwrap();
        let catalog = Arc::new(Catalog::load_from_file(&fixture_path, 5000).unwrap());
        let orderbook = Arc::new(OrderBook::new(catalog.clone(), dir.path()).unwrap());
        let sessions = Arc::new(SessionStore::new(dir.path(), 1800).unwrap());
        let transcripts = Arc::new(TranscriptStore::new(&dir.path().join("transcripts")).unwrap());
        let llm_config = sa_domain::config::LlmConfig {
            router_mode: sa_domain::config::RouterMode::Capability,
            default_timeout_ms: 20_000,
            require_provider: false,
            startup_policy: Default::default(),
            roles: Default::default(),
            providers: Vec::new(),
        };
        let registry = sa_providers::ProviderRegistry::from_config(&llm_config).unwrap();
        let router = Arc::new(LlmRouter::new(registry, llm_config.roles.clone(), llm_config.default_timeout_ms));
        let tts: Arc<dyn TtsSynthesizer> = Arc::new(crate::tts::NullTtsSynthesizer);

        let pipeline = ScriptPipeline::new(catalog, orderbook, router, sessions, transcripts, tts);
        let result = pipeline.continue_conversation("missing", "si").await.unwrap();
        assert!(result.message.to_lowercase().contains("expir"));
        let _ = sample_script();
    }
}
