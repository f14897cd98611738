//! Intent classification and communication-style detection.
//!
//! Both operations try the LLM first under a tight budget and fall back to
//! a deterministic keyword scorer on any timeout, parse failure, or
//! out-of-set label. The keyword path never fails: it always returns a
//! label from the closed set.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use sa_domain::capability::ModelRole;
use sa_domain::model::{Intent, Session, Style};
use sa_domain::tool::{Message, MessageContent, Role as MsgRole};
use sa_domain::trace::TraceEvent;

use crate::router::LlmRouter;
use crate::traits::ChatRequest;

const CLASSIFY_BUDGET: Duration = Duration::from_secs(5);
const STYLE_BUDGET: Duration = Duration::from_secs(5);

/// Phrases that end the conversation before any classification runs.
const STOP_PHRASES: &[&str] = &[
    "no gracias",
    "chao",
    "adiós",
    "adios",
    "mejor no",
    "olvídalo",
    "olvidalo",
    "déjalo así",
    "dejalo asi",
    "ya no quiero",
    "cancela todo",
];

/// Returns `true` when the (already lowercased, trimmed) utterance should
/// short-circuit the turn with a farewell instead of being classified.
pub fn detect_stop_intent(utterance: &str) -> bool {
    let normalized = utterance.trim().to_lowercase();
    STOP_PHRASES.iter().any(|p| normalized.contains(p))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Intent classification
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const SEARCH_KEYWORDS: &[&str] = &[
    "busco", "buscar", "quiero ver", "tienes", "tendrás", "hay", "muéstrame", "muestrame",
    "enséñame", "ensename", "necesito unos", "necesito unas", "modelo", "tallas disponibles",
];
const PERSUASION_KEYWORDS: &[&str] = &[
    "recomiendame",
    "recomiéndame",
    "cuál es mejor",
    "cual es mejor",
    "me conviene",
    "vale la pena",
    "qué opinas",
    "que opinas",
    "sugerencia",
    "cuál me recomiendas",
    "cual me recomiendas",
];
const CHECKOUT_KEYWORDS: &[&str] = &[
    "comprar",
    "compro",
    "quiero comprarlo",
    "quiero comprarlos",
    "finalizar compra",
    "pagar",
    "hacer el pedido",
    "me lo llevo",
    "llevar este",
    "confirmar pedido",
];
const INFO_KEYWORDS: &[&str] = &[
    "horario",
    "horarios",
    "devolución",
    "devolucion",
    "envío",
    "envio",
    "garantía",
    "garantia",
    "ubicación",
    "ubicacion",
    "métodos de pago",
    "metodos de pago",
    "tienda física",
    "tienda fisica",
];
const RECOMMENDATION_KEYWORDS: &[&str] = &[
    "recomienda",
    "recomendación",
    "recomendacion",
    "sugiéreme",
    "sugiereme",
    "cuál me sirve",
    "cual me sirve",
    "para qué sirve",
    "para que sirve",
    "mejor opción",
    "mejor opcion",
];

#[derive(Debug, Clone)]
pub struct IntentResult {
    pub intent: Intent,
    pub confidence: f64,
    pub suggested_agent: String,
    pub rationale: String,
}

#[derive(Debug, Clone)]
pub struct StyleResult {
    pub style: Style,
    pub confidence: f64,
    pub patterns: Vec<String>,
    pub samples: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LlmLabelReply {
    label: String,
    confidence: f64,
    #[serde(default)]
    rationale: String,
}

pub struct Classifier {
    router: Arc<LlmRouter>,
}

impl Classifier {
    pub fn new(router: Arc<LlmRouter>) -> Self {
        Self { router }
    }

    pub async fn classify_intent(&self, session: &Session, utterance: &str) -> IntentResult {
        match self.classify_intent_via_llm(utterance).await {
            Some(result) => result,
            None => {
                TraceEvent::ClassifierFallback {
                    session_id: session.session_id.clone(),
                    reason: "llm path unavailable or returned an invalid label".into(),
                }
                .emit();
                classify_intent_by_keywords(session, utterance)
            }
        }
    }

    async fn classify_intent_via_llm(&self, utterance: &str) -> Option<IntentResult> {
        let system = "Eres un clasificador de intención para un asistente de ventas. \
            Responde EXCLUSIVAMENTE con un JSON de la forma \
            {\"label\": <search|persuasion|checkout|info|recommendation>, \"confidence\": <0..1>, \"rationale\": <texto breve>}. \
            search = el usuario busca productos; persuasion = el usuario duda y quiere que lo convenzan; \
            checkout = el usuario quiere comprar o pagar; info = pregunta sobre horarios, envíos, devoluciones o garantía; \
            recommendation = el usuario pide una recomendación explícita.";

        let req = ChatRequest {
            messages: vec![
                Message {
                    role: MsgRole::System,
                    content: MessageContent::Text(system.to_string()),
                },
                Message {
                    role: MsgRole::User,
                    content: MessageContent::Text(utterance.to_string()),
                },
            ],
            json_mode: true,
            temperature: Some(0.0),
            ..Default::default()
        };

        let response = tokio::time::timeout(
            CLASSIFY_BUDGET,
            self.router.chat_for_role(ModelRole::Classifier, req),
        )
        .await
        .ok()?
        .ok()?;

        let parsed = parse_label_reply(&response.content)?;
        let intent = parse_intent_label(&parsed.label)?;
        let confidence = parsed.confidence.clamp(0.0, 1.0);

        Some(IntentResult {
            intent,
            confidence,
            suggested_agent: intent.default_agent().to_string(),
            rationale: parsed.rationale,
        })
    }

    pub async fn detect_style(&self, session: &Session, recent_utterances: &[String]) -> StyleResult {
        match self.detect_style_via_llm(recent_utterances).await {
            Some(result) => result,
            None => {
                TraceEvent::ClassifierFallback {
                    session_id: session.session_id.clone(),
                    reason: "style llm path unavailable or returned an invalid label".into(),
                }
                .emit();
                detect_style_by_keywords(recent_utterances)
            }
        }
    }

    async fn detect_style_via_llm(&self, recent_utterances: &[String]) -> Option<StyleResult> {
        let system = "Eres un clasificador de estilo de comunicación. Responde EXCLUSIVAMENTE \
            con un JSON de la forma {\"label\": <cuencano|juvenil|formal|neutral>, \"confidence\": <0..1>, \
            \"rationale\": <texto breve>}. cuencano = modismos de Cuenca, Ecuador; juvenil = jerga juvenil \
            e internet; formal = registro formal/usted; neutral = ninguno de los anteriores domina.";

        let joined = recent_utterances.join("\n");
        let req = ChatRequest {
            messages: vec![
                Message {
                    role: MsgRole::System,
                    content: MessageContent::Text(system.to_string()),
                },
                Message {
                    role: MsgRole::User,
                    content: MessageContent::Text(joined),
                },
            ],
            json_mode: true,
            temperature: Some(0.0),
            ..Default::default()
        };

        let response = tokio::time::timeout(
            STYLE_BUDGET,
            self.router.chat_for_role(ModelRole::Classifier, req),
        )
        .await
        .ok()?
        .ok()?;

        let parsed = parse_label_reply(&response.content)?;
        let style = parse_style_label(&parsed.label)?;

        Some(StyleResult {
            style,
            confidence: parsed.confidence.clamp(0.0, 1.0),
            patterns: Vec::new(),
            samples: recent_utterances.to_vec(),
        })
    }
}

/// Strip a fenced code block (```json ... ``` or ``` ... ```) if present,
/// then parse as a strict `{label, confidence, rationale}` object.
fn parse_label_reply(raw: &str) -> Option<LlmLabelReply> {
    let trimmed = raw.trim();
    let stripped = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let stripped = stripped.strip_suffix("```").unwrap_or(stripped).trim();
    serde_json::from_str(stripped).ok()
}

fn parse_intent_label(label: &str) -> Option<Intent> {
    match label.trim().to_lowercase().as_str() {
        "search" => Some(Intent::Search),
        "persuasion" => Some(Intent::Persuasion),
        "checkout" => Some(Intent::Checkout),
        "info" => Some(Intent::Info),
        "recommendation" => Some(Intent::Recommendation),
        _ => None,
    }
}

fn parse_style_label(label: &str) -> Option<Style> {
    match label.trim().to_lowercase().as_str() {
        "cuencano" => Some(Style::Cuencano),
        "juvenil" => Some(Style::Juvenil),
        "formal" => Some(Style::Formal),
        "neutral" => Some(Style::Neutral),
        _ => None,
    }
}

fn count_matches(haystack: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|k| haystack.contains(*k)).count()
}

/// Deterministic keyword scorer. Never fails: a zero-score utterance
/// returns `persuasion` at confidence `1/3`.
fn classify_intent_by_keywords(session: &Session, utterance: &str) -> IntentResult {
    let lower = utterance.to_lowercase();

    let scores = [
        (Intent::Search, count_matches(&lower, SEARCH_KEYWORDS)),
        (Intent::Persuasion, count_matches(&lower, PERSUASION_KEYWORDS)),
        (Intent::Checkout, count_matches(&lower, CHECKOUT_KEYWORDS)),
        (Intent::Info, count_matches(&lower, INFO_KEYWORDS)),
        (
            Intent::Recommendation,
            count_matches(&lower, RECOMMENDATION_KEYWORDS),
        ),
    ];

    let max_score = scores.iter().map(|(_, s)| *s).max().unwrap_or(0);

    if max_score == 0 {
        return IntentResult {
            intent: Intent::Persuasion,
            confidence: 1.0 / 3.0,
            suggested_agent: Intent::Persuasion.default_agent().to_string(),
            rationale: "sin coincidencias de palabras clave".into(),
        };
    }

    let tied: Vec<Intent> = scores
        .iter()
        .filter(|(_, s)| *s == max_score)
        .map(|(i, _)| *i)
        .collect();

    let intent = if tied.len() == 1 {
        tied[0]
    } else if !session.last_search_results.is_empty() {
        if tied.contains(&Intent::Checkout) {
            Intent::Checkout
        } else {
            Intent::Persuasion
        }
    } else {
        Intent::Persuasion
    };

    let confidence = (max_score as f64 / 3.0).min(1.0);

    IntentResult {
        intent,
        confidence,
        suggested_agent: intent.default_agent().to_string(),
        rationale: format!("keyword score {max_score} for '{intent}'"),
    }
}

const CUENCANO_MARKERS: &[&str] = &["ñaño", "ñañito", "pucha", "chuta", "de ley", "full chevere"];
const JUVENIL_MARKERS: &[&str] = &["bro", "parce", "xd", "jaja", "asu", "we"];
const FORMAL_MARKERS: &[&str] = &["usted", "estimado", "cordialmente", "quisiera", "le agradecería"];

/// Deterministic keyword style scorer over the recent user utterances.
fn detect_style_by_keywords(recent_utterances: &[String]) -> StyleResult {
    let joined = recent_utterances.join(" ").to_lowercase();

    let scores = [
        (Style::Cuencano, CUENCANO_MARKERS),
        (Style::Juvenil, JUVENIL_MARKERS),
        (Style::Formal, FORMAL_MARKERS),
    ];

    let mut best = (Style::Neutral, 0usize, Vec::<String>::new());
    for (style, markers) in scores {
        let hits: Vec<String> = markers
            .iter()
            .filter(|m| joined.contains(*m))
            .map(|m| m.to_string())
            .collect();
        if hits.len() > best.1 {
            best = (style, hits.len(), hits);
        }
    }

    let confidence = (best.1 as f64 / 3.0).min(1.0);

    StyleResult {
        style: best.0,
        confidence,
        patterns: best.2,
        samples: recent_utterances.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_intent_matches_fixed_phrases() {
        assert!(detect_stop_intent("Mejor no, gracias"));
        assert!(detect_stop_intent("chao"));
        assert!(!detect_stop_intent("quiero comprar unas zapatillas"));
    }

    #[test]
    fn keyword_classifier_returns_persuasion_on_zero_score() {
        let session = Session::new("s1");
        let result = classify_intent_by_keywords(&session, "hola que tal");
        assert_eq!(result.intent, Intent::Persuasion);
        assert!((result.confidence - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn keyword_classifier_breaks_ties_toward_checkout_with_prior_results() {
        let mut session = Session::new("s1");
        session.last_search_results.push(sa_domain::model::ProductProjection {
            id: "p1".into(),
            name: "Zapatillas".into(),
            barcode: None,
            brand: None,
            category: None,
            unit_price: 10.0,
            final_price: 10.0,
            discount_percent: None,
            promotion_text: None,
            promotion_valid_until: None,
            available: 1,
            active: true,
            location: None,
        });
        // "comprar" hits checkout, "recomiendame" hits persuasion: a tie.
        let result = classify_intent_by_keywords(&session, "comprar o recomiendame algo");
        assert_eq!(result.intent, Intent::Checkout);
    }

    #[test]
    fn parse_label_reply_strips_fenced_code_block() {
        let raw = "```json\n{\"label\": \"search\", \"confidence\": 0.9, \"rationale\": \"ok\"}\n```";
        let parsed = parse_label_reply(raw).unwrap();
        assert_eq!(parsed.label, "search");
    }

    #[test]
    fn style_keyword_scorer_falls_back_to_neutral() {
        let result = detect_style_by_keywords(&["buenos días, quiero información".to_string()]);
        assert_eq!(result.style, Style::Neutral);
    }
}
