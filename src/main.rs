//! Mock Paper · exam practice backend
//!
//! - One exam session: setup -> generating -> taking exam -> evaluating -> results
//! - Gemini generates the question paper and grades the answers (structured JSON output)
//! - Axum HTTP + WebSocket API for the browser surfaces, static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   GEMINI_API_KEY      : required (API_KEY is accepted as a fallback)
//!   GEMINI_BASE_URL     : default "https://generativelanguage.googleapis.com/v1beta"
//!   GEMINI_FAST_MODEL   : paper generation, default "gemini-2.5-flash"
//!   GEMINI_STRONG_MODEL : answer evaluation, default "gemini-2.5-pro"
//!   MODEL_TIMEOUT_SECS  : per-call timeout, default 120
//!   AGENT_CONFIG_PATH   : path to TOML config (prompts + paper constraints)
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

mod config;
mod domain;
mod error;
mod gemini;
mod paper;
mod protocol;
mod routes;
mod schema;
mod session;
mod state;
mod telemetry;
mod util;

#[cfg(test)]
mod testing;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::ConfigError;
use crate::routes::build_router;
use crate::state::AppState;

fn listen_addr() -> Result<SocketAddr, ConfigError> {
  let port = match std::env::var("PORT") {
    Ok(p) => p
      .trim()
      .parse::<u16>()
      .map_err(|_| ConfigError::InvalidValue { var: "PORT", value: p })?,
    Err(_) => 3000,
  };
  Ok(SocketAddr::from(([0, 0, 0, 0], port)))
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    error!(target: "mockpaper_backend", error = %e, "Failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  info!(target: "mockpaper_backend", "Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // The model credential is mandatory; refuse to start without it.
  let state = match AppState::from_env() {
    Ok(state) => Arc::new(state),
    Err(e) => {
      error!(target: "mockpaper_backend", error = %e, "Startup configuration invalid");
      return Err(e.into());
    }
  };

  let app = build_router(state);
  let addr = listen_addr()?;

  let listener = TcpListener::bind(addr).await?;
  info!(target: "mockpaper_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
  Ok(())
}
