//! Shared data model: conversation sessions, catalog projections, orders,
//! and transcript records. These types are serialized as-is to the JSON
//! stores owned by `sa-sessions`, `sa-catalog`, and `sa-orderbook`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Closed sets
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Intent set produced by the Classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Search,
    Persuasion,
    Checkout,
    Info,
    Recommendation,
}

impl Intent {
    /// The agent this intent routes to.
    pub fn default_agent(self) -> &'static str {
        match self {
            Intent::Search | Intent::Info => "retriever",
            Intent::Persuasion | Intent::Recommendation => "sales",
            Intent::Checkout => "checkout",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Intent::Search => "search",
            Intent::Persuasion => "persuasion",
            Intent::Checkout => "checkout",
            Intent::Info => "info",
            Intent::Recommendation => "recommendation",
        };
        write!(f, "{s}")
    }
}

/// Communication style set detected by the Classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Style {
    Cuencano,
    Juvenil,
    Formal,
    #[default]
    Neutral,
}

impl std::fmt::Display for Style {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Style::Cuencano => "cuencano",
            Style::Juvenil => "juvenil",
            Style::Formal => "formal",
            Style::Neutral => "neutral",
        };
        write!(f, "{s}")
    }
}

/// Staged checkout state held on a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStage {
    Confirm,
    Address,
    Payment,
    Complete,
}

/// High-level conversation stage, independent of checkout substage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStage {
    AwaitingConfirm,
    AwaitingShipping,
    ReadyToCheckout,
    SeekingAlternative,
}

/// Role of a turn in conversation history / transcripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Agent,
    System,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session (C1)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One turn of conversation history, capped to a ring by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub text: String,
}

/// A cart line: a product pinned at a quantity and the unit price it was
/// added at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: String,
    pub unit_price: f64,
    pub quantity: u32,
}

/// Chat conversation state, one per session id. Owned exclusively by the
/// in-flight request handler for the duration of a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub recent_utterance: String,
    #[serde(default)]
    pub last_intent: Option<Intent>,
    #[serde(default)]
    pub style: Style,
    #[serde(default)]
    pub history: Vec<HistoryTurn>,
    #[serde(default)]
    pub last_search_results: Vec<ProductProjection>,
    #[serde(default)]
    pub selected_product_ids: Vec<String>,
    #[serde(default)]
    pub cart: Vec<CartLine>,
    #[serde(default)]
    pub cart_total: f64,
    #[serde(default)]
    pub checkout_stage: Option<CheckoutStage>,
    /// Pointer into `last_search_results` for the conversational checkout's
    /// ranked-alternatives walk (distinct from `ScriptSession::chosen_index`,
    /// which walks the Comparator's ranked list instead).
    #[serde(default)]
    pub checkout_candidate_index: usize,
    #[serde(default)]
    pub shipping_address: Option<String>,
    #[serde(default)]
    pub conversation_stage: Option<ConversationStage>,
    #[serde(default)]
    pub slots: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub unanswered_question_count: u32,
    pub created_at: DateTime<Utc>,
}

/// Maximum number of history turns retained per session (ring buffer cap).
pub const HISTORY_CAP: usize = 40;

impl Session {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: None,
            recent_utterance: String::new(),
            last_intent: None,
            style: Style::default(),
            history: Vec::new(),
            last_search_results: Vec::new(),
            selected_product_ids: Vec::new(),
            cart: Vec::new(),
            cart_total: 0.0,
            checkout_stage: None,
            checkout_candidate_index: 0,
            shipping_address: None,
            conversation_stage: None,
            slots: std::collections::HashMap::new(),
            unanswered_question_count: 0,
            created_at: Utc::now(),
        }
    }

    /// Append a turn to history, trimming the oldest entries beyond the cap.
    pub fn push_history(&mut self, role: Role, text: impl Into<String>) {
        self.history.push(HistoryTurn {
            role,
            text: text.into(),
        });
        if self.history.len() > HISTORY_CAP {
            let excess = self.history.len() - HISTORY_CAP;
            self.history.drain(0..excess);
        }
    }

    /// Recompute `cart_total` from the cart lines. Callers MUST call this
    /// after any cart mutation to preserve the cart-total invariant.
    pub fn recompute_cart_total(&mut self) {
        self.cart_total = self
            .cart
            .iter()
            .map(|l| l.unit_price * l.quantity as f64)
            .sum();
    }

    pub fn clear_cart(&mut self) {
        self.cart.clear();
        self.cart_total = 0.0;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ScriptSession (C1, alternate shape)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Parsed shipping details captured during a script continuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub size: u32,
    pub address: String,
}

/// State seeded by the ScriptPipeline and advanced by
/// `ContinueConversation`. Coexists with `Session` under a disjoint key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptSession {
    pub session_id: String,
    pub ranked: Vec<ProductProjection>,
    #[serde(default)]
    pub chosen_index: usize,
    pub style: Style,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub shipping_info: Option<ShippingInfo>,
    #[serde(default)]
    pub order_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ScriptSession {
    pub fn best(&self) -> Option<&ProductProjection> {
        self.ranked.get(self.chosen_index)
    }

    /// Advance to the next ranked candidate. Returns `false` when there is
    /// no next candidate.
    pub fn advance(&mut self) -> bool {
        if self.chosen_index + 1 < self.ranked.len() {
            self.chosen_index += 1;
            true
        } else {
            false
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProductProjection (C3)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Immutable read-side snapshot of a catalog row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductProjection {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub unit_price: f64,
    pub final_price: f64,
    #[serde(default)]
    pub discount_percent: Option<f64>,
    #[serde(default)]
    pub promotion_text: Option<String>,
    #[serde(default)]
    pub promotion_valid_until: Option<DateTime<Utc>>,
    pub available: u32,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub location: Option<String>,
}

fn default_true() -> bool {
    true
}

impl ProductProjection {
    /// Whether an active promotion is currently within its validity window.
    pub fn promotion_is_valid(&self, now: DateTime<Utc>) -> bool {
        match self.promotion_valid_until {
            Some(until) => now <= until,
            None => self.promotion_text.is_some(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Order (C4)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Draft,
    Confirmed,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// Whether a transition from `self` to `target` is permitted by the
    /// status graph.
    pub fn can_transition_to(self, target: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, target),
            (Draft, Confirmed)
                | (Draft, Cancelled)
                | (Confirmed, Paid)
                | (Confirmed, Cancelled)
                | (Paid, Processing)
                | (Paid, Refunded)
                | (Processing, Shipped)
                | (Processing, Cancelled)
                | (Shipped, Delivered)
                | (Delivered, Refunded)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub product_name: String,
    #[serde(default)]
    pub sku: Option<String>,
    pub quantity: u32,
    pub unit_price: f64,
    #[serde(default)]
    pub discount: f64,
}

impl OrderLine {
    pub fn subtotal(&self) -> f64 {
        self.unit_price * self.quantity as f64 - self.discount
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub lines: Vec<OrderLine>,
    pub subtotal: f64,
    #[serde(default)]
    pub tax: f64,
    #[serde(default)]
    pub shipping: f64,
    #[serde(default)]
    pub discount: f64,
    pub total: f64,
    pub shipping_address: String,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Render the order's human-facing number: `ORD-` followed by the
    /// first 8 hex characters of the id, uppercased.
    pub fn order_number(&self) -> String {
        let clean: String = self.id.chars().filter(|c| c.is_ascii_hexdigit()).collect();
        let prefix: String = clean.chars().take(8).collect::<String>().to_uppercase();
        format!("ORD-{prefix}")
    }

    pub fn recompute_totals(&mut self) {
        self.subtotal = self.lines.iter().map(OrderLine::subtotal).sum();
        self.total = (self.subtotal + self.tax + self.shipping - self.discount).max(0.0);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TranscriptRecord (C2)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub id: String,
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub role: Role,
    pub body: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub archived: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Script input (ScriptPipeline, C8) and agent responses
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Priority/urgency scale shared by script products and preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Alta,
    Media,
    Baja,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Text,
    Voice,
    Image,
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryIntent {
    Buy,
    Compare,
    Inform,
    Recommend,
}

/// One candidate product surfaced upstream (e.g. by image/voice capture)
/// and handed to the ScriptPipeline for ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptProduct {
    pub barcode: String,
    pub detected_name: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub priority: Priority,
    pub reason_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptPreferences {
    pub style: Style,
    #[serde(default)]
    pub intended_use: Option<String>,
    #[serde(default)]
    pub activity_level: Option<String>,
    #[serde(default)]
    pub preferred_size: Option<String>,
    #[serde(default)]
    pub preferred_color: Option<String>,
    #[serde(default)]
    pub budget_max: Option<f64>,
    #[serde(default)]
    pub wants_promos: bool,
    pub urgency: Priority,
    #[serde(default)]
    pub important_features: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptContext {
    pub input_kind: InputKind,
    #[serde(default)]
    pub explicit_product: Option<String>,
    #[serde(default)]
    pub needs_recommendation: bool,
    pub primary_intent: PrimaryIntent,
    #[serde(default)]
    pub extra_constraints: Vec<String>,
}

/// Structured recommendation request handed to `ScriptPipeline::process_script`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    pub session_id: String,
    pub products: Vec<ScriptProduct>,
    pub preferences: ScriptPreferences,
    pub context: ScriptContext,
    pub original_text: String,
    pub summary: String,
    pub confidence: f64,
}

/// What the caller should do next after a ScriptPipeline response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStep {
    ConfirmBuy,
    NeedShipping,
    MoreInfo,
    Retry,
    ShowAlternatives,
    OrderCompleted,
}

/// The uniform shape every Agent and the Orchestrator return from `process`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub agent: String,
    pub reply_text: String,
    pub new_session: Session,
    pub should_transfer: bool,
    #[serde(default)]
    pub transfer_to: Option<String>,
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, serde_json::Value>,
}

impl AgentResponse {
    pub fn stay(agent: impl Into<String>, reply_text: impl Into<String>, session: Session) -> Self {
        Self {
            agent: agent.into(),
            reply_text: reply_text.into(),
            new_session: session,
            should_transfer: false,
            transfer_to: None,
            metadata: std::collections::HashMap::new(),
        }
    }

    pub fn transfer(
        agent: impl Into<String>,
        reply_text: impl Into<String>,
        session: Session,
        transfer_to: impl Into<String>,
    ) -> Self {
        Self {
            agent: agent.into(),
            reply_text: reply_text.into(),
            new_session: session,
            should_transfer: true,
            transfer_to: Some(transfer_to.into()),
            metadata: std::collections::HashMap::new(),
        }
    }

    pub fn with_error(mut self, kind: impl Into<String>) -> Self {
        self.metadata
            .insert("error".to_string(), serde_json::Value::String(kind.into()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_history_caps_at_limit() {
        let mut s = Session::new("s1");
        for i in 0..(HISTORY_CAP + 10) {
            s.push_history(Role::User, format!("turn {i}"));
        }
        assert_eq!(s.history.len(), HISTORY_CAP);
        assert_eq!(s.history[0].text, "turn 10");
    }

    #[test]
    fn cart_total_recomputes_from_lines() {
        let mut s = Session::new("s1");
        s.cart.push(CartLine {
            product_id: "p1".into(),
            unit_price: 10.0,
            quantity: 3,
        });
        s.recompute_cart_total();
        assert_eq!(s.cart_total, 30.0);
    }

    #[test]
    fn order_number_formats_first_eight_hex_uppercase() {
        let order = Order {
            id: "abcdef1234567890".into(),
            user_id: "u1".into(),
            status: OrderStatus::Confirmed,
            payment_status: PaymentStatus::Pending,
            lines: vec![],
            subtotal: 0.0,
            tax: 0.0,
            shipping: 0.0,
            discount: 0.0,
            total: 0.0,
            shipping_address: "addr".into(),
            contact: None,
            session_id: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(order.order_number(), "ORD-ABCDEF12");
    }

    #[test]
    fn status_transition_graph_rejects_terminal_states() {
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Confirmed));
        assert!(!OrderStatus::Refunded.can_transition_to(OrderStatus::Paid));
        assert!(OrderStatus::Confirmed.can_transition_to(OrderStatus::Cancelled));
    }
}
