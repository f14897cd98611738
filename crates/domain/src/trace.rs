use serde::Serialize;

/// Structured trace events emitted across the engine's crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    /// Emitted by the Classifier once an intent decision has been reached,
    /// whether by the LLM path or the keyword fallback.
    IntentClassified {
        session_id: String,
        intent: String,
        confidence: f32,
        source: String,
    },
    /// Emitted alongside `IntentClassified` when a communication style
    /// was also detected for the turn.
    StyleDetected {
        session_id: String,
        style: String,
        confidence: f32,
    },
    /// Emitted by the Orchestrator on every agent handoff.
    AgentTransfer {
        session_id: String,
        from: String,
        to: String,
        turn_transfer_count: u32,
    },
    /// Emitted when the Orchestrator's loop guard refuses a transfer
    /// because it would re-create an edge already taken this turn.
    TransferLoopBroken { session_id: String, edge: String },
    /// Emitted by the OrderBook once an order transaction commits.
    OrderCreated {
        order_id: String,
        product_count: usize,
        total: f64,
    },
    /// Emitted by the OrderBook when an order is cancelled.
    OrderCancelled { order_id: String, reason: String },
    /// Emitted by the OrderBook for every stock row decrement, including
    /// the remaining quantity after the decrement.
    StockDecremented {
        product_id: String,
        by: u32,
        remaining: u32,
    },
    /// Emitted by the ScriptPipeline once a product set has been scored
    /// and a best candidate selected.
    ScriptProcessed {
        session_id: String,
        product_count: usize,
        best_id: String,
    },
    /// Emitted when the Classifier's LLM call fails or times out and the
    /// keyword fallback path is used instead.
    ClassifierFallback { session_id: String, reason: String },
    /// Emitted by the LLM router for every chat request, successful or not.
    LlmRequest {
        provider: String,
        model: String,
        role: String,
        streaming: bool,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    /// Emitted by the LLM router whenever it falls through to a
    /// configured fallback model.
    LlmFallback {
        from_provider: String,
        from_model: String,
        to_provider: String,
        to_model: String,
        reason: String,
    },
    /// Emitted by the SessionStore when a session key resolves to an
    /// existing or newly created session.
    SessionResolved {
        session_key: String,
        session_id: String,
        is_new: bool,
    },
    /// Emitted when a session is evicted (TTL expiry or explicit reset)
    /// and replaced with a fresh one under the same key.
    SessionReset {
        session_key: String,
        old_session_id: String,
        new_session_id: String,
        reason: String,
    },
    /// Emitted by the TranscriptStore on every append.
    TranscriptAppend { session_id: String, lines: usize },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "sa_event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_classified_serializes_with_tag() {
        let event = TraceEvent::IntentClassified {
            session_id: "sess-1".into(),
            intent: "browse_catalog".into(),
            confidence: 0.92,
            source: "llm".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"IntentClassified\""));
        assert!(json.contains("\"source\":\"llm\""));
    }

    #[test]
    fn transfer_loop_broken_carries_edge() {
        let event = TraceEvent::TransferLoopBroken {
            session_id: "sess-1".into(),
            edge: "sales->checkout".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("sales->checkout"));
    }
}
