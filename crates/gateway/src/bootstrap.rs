//! Composition root: wires every crate in the workspace into one
//! [`AppState`], grounded on the teacher's own `build_app_state` shape
//! (one function, fallible, called once from `main`).

use std::sync::Arc;

use anyhow::Context;

use sa_agents::faq::KeywordFaqStore;
use sa_agents::{CheckoutAgent, RetrieverAgent, SalesAgent};
use sa_catalog::Catalog;
use sa_domain::config::Config;
use sa_orderbook::OrderBook;
use sa_orchestrator::Orchestrator;
use sa_providers::classifier::Classifier;
use sa_providers::LlmRouter;
use sa_script::{NullTtsSynthesizer, ScriptPipeline};
use sa_sessions::{SessionStore, TranscriptStore};

use crate::api::auth::{JwtKeys, UserStore};
use crate::state::AppState;

pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    let state_path = &config.sessions.state_path;
    std::fs::create_dir_all(state_path)
        .with_context(|| format!("creating state dir {}", state_path.display()))?;

    let catalog = Arc::new(
        Catalog::load_from_file(&config.catalog.seed_path, config.catalog.read_timeout_ms)
            .context("loading catalog seed")?,
    );
    let orderbook = Arc::new(
        OrderBook::new(catalog.clone(), state_path).context("opening order book")?,
    );
    let sessions = Arc::new(
        SessionStore::new(state_path, config.sessions.ttl_seconds as i64)
            .context("opening session store")?,
    );
    let transcripts = Arc::new(
        TranscriptStore::new(&state_path.join("transcripts"))
            .context("opening transcript store")?,
    );

    let router = Arc::new(LlmRouter::from_config(&config.llm).context("building LLM router")?);
    let classifier = Arc::new(Classifier::new(router.clone()));

    let faq = Arc::new(KeywordFaqStore::empty());
    let retriever = Arc::new(RetrieverAgent::new(catalog.clone(), faq.clone()));
    let sales = Arc::new(SalesAgent::new(router.clone(), faq));
    let checkout = Arc::new(CheckoutAgent::new(orderbook.clone()));

    let tts: Arc<dyn sa_script::TtsSynthesizer> =
        match sa_script::HttpTtsSynthesizer::from_config(&config.tts)
            .context("building TTS synthesizer")?
        {
            Some(http) => Arc::new(http),
            None => Arc::new(NullTtsSynthesizer),
        };

    let script_pipeline = Arc::new(ScriptPipeline::new(
        catalog.clone(),
        orderbook.clone(),
        router.clone(),
        sessions.clone(),
        transcripts.clone(),
        tts.clone(),
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        sessions.clone(),
        transcripts.clone(),
        classifier,
        retriever,
        sales,
        checkout,
        script_pipeline.clone(),
    ));

    let users = Arc::new(UserStore::new(state_path).context("opening user store")?);
    let jwt = Arc::new(JwtKeys::from_config(&config.auth).context("loading JWT signing key")?);

    Ok(AppState {
        config,
        catalog,
        orderbook,
        sessions,
        transcripts,
        orchestrator,
        script_pipeline,
        tts,
        users,
        jwt,
    })
}
