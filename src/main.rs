//! Kalen Command · Practice Session Backend
//!
//! - Axum HTTP + WebSocket API driving the mission engine
//! - Optional OpenAI integration (via environment variables)
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT          : u16 (default 3000)
//!   OPENAI_API_KEY    : enables model-generated missions if present
//!   OPENAI_BASE_URL    : default "https://api.openai.com/v1"
//!   OPENAI_FAST_MODEL  : default "gpt-4o-mini"
//!   OPENAI_STRONG_MODEL   : default "gpt-4o"
//!   OPENAI_TRANSCRIBE_MODEL : default "whisper-1"
//!   OPENAI_IMAGE_MODEL : default "gpt-image-1"
//!   ENGINE_CONFIG_PATH : path to TOML config (prompt templates)
//!   PROFILE_PATH    : learner profile JSON (default ./profile.json)
//!   LOG_LEVEL    : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT      : "pretty" (default) or "json"

mod telemetry;
mod util;
mod error;
mod domain;
mod curriculum;
mod progress;
mod speech;
mod scoring;
mod session;
mod ports;
mod config;
mod seeds;
mod provider;
mod state;
mod protocol;
mod routes;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (profile, session controller, ports).
  let state = AppState::new();

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state);

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "kalen_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
