pub mod auth;
pub mod handlers;
pub mod transcripts;

use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorLayer;

use crate::state::AppState;

/// Per-IP token bucket built the same way the teacher's `main.rs` builds
/// its single global limiter, just applied per route tier (§6) instead of
/// globally. A macro, not a function, because `GovernorConfigBuilder`'s
/// default key extractor/middleware type params aren't worth naming here.
macro_rules! governor_layer {
    ($per_minute:expr) => {{
        let per_minute: u32 = $per_minute.max(1);
        let refill_seconds: u64 = (60 / per_minute).max(1) as u64;
        let config = GovernorConfigBuilder::default()
            .per_second(refill_seconds)
            .burst_size(per_minute)
            .finish()
            .expect("rate limit per_second/burst must be > 0");
        GovernorLayer {
            config: std::sync::Arc::new(config),
        }
    }};
}

/// Build the full API router: public routes (login, health, catalog
/// browsing), and protected routes gated on [`auth::require_auth`], each
/// tier behind its own per-IP rate limit per §6.
pub fn router(state: AppState) -> Router {
    let rl = state.config.rate_limit.clone();

    let public = Router::new()
        .route("/api/v1/login", post(auth::login))
        .layer(governor_layer!(rl.login_per_minute))
        .route("/api/v1/products", get(handlers::list_products))
        .merge(
            Router::new()
                .route("/api/v1/health", get(handlers::health))
                .layer(governor_layer!(rl.health_per_minute)),
        );

    let protected = Router::new()
        .route("/api/v1/chat", post(handlers::chat))
        .route("/api/v1/chat/history", get(handlers::chat_history))
        .route("/api/v1/conversations", get(handlers::conversations))
        .route("/api/v1/orders/:id", get(handlers::get_order))
        .route("/api/v1/orders", post(handlers::create_order))
        .route("/api/v1/orders/cancel", post(handlers::cancel_order))
        .route("/api/v1/script/process", post(handlers::process_script))
        .route(
            "/api/v1/script/continue",
            post(handlers::continue_conversation),
        )
        .route("/api/v1/transcripts", get(transcripts::by_session))
        .route("/api/v1/transcripts/mine", get(transcripts::by_user))
        .route("/api/v1/transcripts/by_order/:order_id", get(transcripts::by_order))
        .route("/api/v1/transcripts/:id", put(transcripts::update))
        .route("/api/v1/transcripts/:id", delete(transcripts::delete))
        .route("/api/v1/transcripts/:id/archive", post(transcripts::archive))
        .layer(governor_layer!(rl.query_per_minute))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    public
        .merge(protected)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
