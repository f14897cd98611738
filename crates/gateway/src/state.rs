use std::sync::Arc;

use sa_catalog::Catalog;
use sa_domain::config::Config;
use sa_orderbook::OrderBook;
use sa_orchestrator::Orchestrator;
use sa_script::{ScriptPipeline, TtsSynthesizer};
use sa_sessions::{SessionStore, TranscriptStore};

use crate::api::auth::{JwtKeys, UserStore};

/// Shared application state, cloned into every axum handler. Every field
/// is an `Arc` so cloning is cheap and safe across the tokio runtime.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<Catalog>,
    pub orderbook: Arc<OrderBook>,
    pub sessions: Arc<SessionStore>,
    pub transcripts: Arc<TranscriptStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub script_pipeline: Arc<ScriptPipeline>,
    pub tts: Arc<dyn TtsSynthesizer>,
    pub users: Arc<UserStore>,
    pub jwt: Arc<JwtKeys>,
}
