//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use tracing::{debug, error, info, instrument};

use crate::protocol::{profile_out, to_out, ClientWsMessage, ServerWsMessage};
use crate::state::{AdvanceReply, AppState};

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!(target: "kalen_backend", "WebSocket upgrade requested");
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: AppState) {
    info!(target: "kalen_backend", "WebSocket connected");
    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(txt) => {
                // Parse, dispatch, serialize response.
                let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
                    Ok(incoming) => {
                        debug!(target = "kalen_backend", "WS received: {:?}", &incoming);
                        handle_client_ws(incoming, &state).await
                    }
                    Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
                };

                let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
                    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
                });

                if let Err(e) = socket.send(Message::Text(out)).await {
                    error!(target: "kalen_backend", error = %e, "WS send error");
                    break;
                }
            }
            Message::Ping(payload) => {
                let _ = socket.send(Message::Pong(payload)).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    info!(target: "kalen_backend", "WebSocket disconnected");
}

#[instrument(level = "info", skip(state))]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
    match msg {
        ClientWsMessage::Ping => ServerWsMessage::Pong,

        ClientWsMessage::Profile => {
            ServerWsMessage::Profile { profile: profile_out(&state.profile().await) }
        }

        ClientWsMessage::SetDifficulty { level } => match state.set_difficulty(level).await {
            Ok(profile) => ServerWsMessage::Profile { profile: profile_out(&profile) },
            Err(e) => ServerWsMessage::Error { message: e.to_string() },
        },

        ClientWsMessage::NewMission { kind, topic } => {
            match state.start_mission(kind, topic).await {
                Ok((mission_id, exercise)) => {
                    info!(target: "mission", %kind, %mission_id, "WS mission served");
                    ServerWsMessage::Mission { mission_id, exercise: to_out(&exercise) }
                }
                Err(e) => ServerWsMessage::Error { message: e.to_string() },
            }
        }

        ClientWsMessage::SelectBlank { blank_id, word } => {
            match state.controller.select_blank(blank_id, word).await {
                Ok(()) => ServerWsMessage::Ack,
                Err(e) => ServerWsMessage::Error { message: e.to_string() },
            }
        }

        ClientWsMessage::SelectAnswer { question, option } => {
            match state.controller.select_answer(question, option).await {
                Ok(()) => ServerWsMessage::Ack,
                Err(e) => ServerWsMessage::Error { message: e.to_string() },
            }
        }

        ClientWsMessage::SubmitAnswer { response } => match state.submit(response).await {
            Ok(verdict) => {
                info!(target: "mission", "WS submission scored");
                ServerWsMessage::Verdict { verdict }
            }
            Err(e) => ServerWsMessage::Error { message: e.to_string() },
        },

        ClientWsMessage::Advance => match state.advance().await {
            Ok(AdvanceReply::Completed { xp, profile }) => {
                ServerWsMessage::MissionComplete { xp, profile: profile_out(&profile) }
            }
            Ok(AdvanceReply::Next { mission_id, exercise }) => {
                ServerWsMessage::Mission { mission_id, exercise: to_out(&exercise) }
            }
            Err(e) => ServerWsMessage::Error { message: e.to_string() },
        },

        ClientWsMessage::AbortMission => {
            state.abort().await;
            ServerWsMessage::Ack
        }

        ClientWsMessage::Illustration => {
            ServerWsMessage::Illustration { image_b64: state.controller.illustration().await }
        }

        ClientWsMessage::PlayTransmission => match state.controller.play_transmission().await {
            Ok(()) => ServerWsMessage::Ack,
            Err(e) => ServerWsMessage::Error { message: e.to_string() },
        },

        ClientWsMessage::Speak { text, lang } => {
            state.controller.speak(&text, lang).await;
            ServerWsMessage::Ack
        }

        ClientWsMessage::StopAudio => {
            state.controller.stop_audio().await;
            ServerWsMessage::Ack
        }
    }
}
