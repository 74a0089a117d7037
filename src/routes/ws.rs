//! WebSocket upgrade + message loop. On connect the client receives the current
//! session; afterwards every session change is pushed as a `session` message.
//! Client messages are parsed as JSON intents; rejected intents get an `error`.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument};

use crate::domain::SubjectInfo;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::{AppState, Submitted};

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "mockpaper_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn send(socket: &mut WebSocket, msg: &ServerWsMessage) -> bool {
  let out = serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  });
  match socket.send(Message::Text(out)).await {
    Ok(()) => true,
    Err(e) => {
      error!(target: "mockpaper_backend", error = %e, "WS send error");
      false
    }
  }
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "mockpaper_backend", "WebSocket connected");
  let mut updates = state.subscribe();
  let initial = updates.borrow_and_update().clone();
  if !send(&mut socket, &ServerWsMessage::Session { session: initial }).await {
    return;
  }

  loop {
    tokio::select! {
      changed = updates.changed() => {
        if changed.is_err() { break; }
        let session = updates.borrow_and_update().clone();
        if !send(&mut socket, &ServerWsMessage::Session { session }).await { break; }
      }
      incoming = socket.recv() => {
        let Some(Ok(msg)) = incoming else { break };
        match msg {
          Message::Text(txt) => {
            // Accepted intents are answered through the watch channel; only
            // pongs and rejections are replied to directly.
            let reply = match serde_json::from_str::<ClientWsMessage>(&txt) {
              Ok(intent) => {
                debug!(target: "mockpaper_backend", ?intent, "WS received");
                handle_client_ws(intent, &state).await
              }
              Err(e) => Some(ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) }),
            };
            if let Some(reply) = reply {
              if !send(&mut socket, &reply).await { break; }
            }
          }
          Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
          Message::Close(_) => break,
          _ => {}
        }
      }
    }
  }
  info!(target: "mockpaper_backend", "WebSocket disconnected");
}

async fn handle_client_ws(msg: ClientWsMessage, state: &Arc<AppState>) -> Option<ServerWsMessage> {
  let rejected = match msg {
    ClientWsMessage::Ping => return Some(ServerWsMessage::Pong),
    ClientWsMessage::Setup { scheme, subject } => state.submit_setup(SubjectInfo { scheme, subject }).await.map(Submitted::detach).err(),
    ClientWsMessage::Answer { question_number, text } => state.update_answer(&question_number, text).await.err(),
    ClientWsMessage::Submit { answers } => state.submit_answers(answers).await.map(Submitted::detach).err(),
    ClientWsMessage::Restart => {
      state.restart().await;
      None
    }
  };
  rejected.map(|e| {
    tracing::warn!(target: "exam", error = %e, "WS intent rejected");
    ServerWsMessage::Error { message: e.to_string() }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::AgentConfig;
  use crate::domain::Scheme;
  use crate::session::PhaseKind;
  use crate::testing::{two_question_paper_json, ScriptedModel};

  fn state_with(model: ScriptedModel) -> Arc<AppState> {
    Arc::new(AppState::new(Arc::new(model), AgentConfig::default()))
  }

  #[tokio::test]
  async fn ping_gets_pong() {
    let state = state_with(ScriptedModel::default());
    assert!(matches!(handle_client_ws(ClientWsMessage::Ping, &state).await, Some(ServerWsMessage::Pong)));
  }

  #[tokio::test]
  async fn submit_during_setup_is_answered_with_error() {
    let state = state_with(ScriptedModel::default());
    let reply = handle_client_ws(ClientWsMessage::Submit { answers: None }, &state).await;
    let Some(ServerWsMessage::Error { message }) = reply else { panic!("expected an error, got {reply:?}") };
    assert!(message.contains("submit answers"), "{message}");
    assert_eq!(state.view().await.phase, PhaseKind::Setup);
  }

  #[tokio::test]
  async fn accepted_setup_is_pushed_through_the_watch_channel() {
    let model = ScriptedModel::gated(vec![Ok(two_question_paper_json())]);
    let state = state_with(model.clone());
    let mut updates = state.subscribe();
    assert_eq!(updates.borrow_and_update().phase, PhaseKind::Setup);

    let setup = ClientWsMessage::Setup { scheme: Scheme::I, subject: "Programming in C".into() };
    assert!(handle_client_ws(setup, &state).await.is_none());

    assert!(updates.has_changed().unwrap());
    assert_eq!(updates.borrow_and_update().phase, PhaseKind::Generating);

    model.release(1);
    updates.changed().await.unwrap();
    assert_eq!(updates.borrow_and_update().phase, PhaseKind::TakingExam);
  }
}
