//! HTTP surface for the conversational orchestration engine: axum routes,
//! JWT auth, CORS, rate limiting, and the composition root that wires every
//! other crate into one `AppState`.

pub mod api;
pub mod bootstrap;
pub mod state;
