//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::http::middleware::verify_jwt;
use crate::session::{Connection, Identity};
use crate::util::rate_limit::PlayerRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Signed token issued by the auth service
    pub token: String,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    // Verify token before upgrading
    match verify_jwt(&query.token, &state.config.auth_jwt_secret) {
        Ok(claims) => {
            let identity = Identity::new(claims.sub);
            info!(identity = %identity, "WebSocket upgrade for authenticated user");
            ws.on_upgrade(move |socket| handle_socket(socket, identity, state))
        }
        Err(e) => {
            error!(error = %e, "WebSocket auth failed");
            (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
        }
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, identity: Identity, state: AppState) {
    let (connection, outbound_rx) = Connection::new(identity.clone(), true);

    // Queue the welcome before presence so it is the first frame out
    connection.send(ServerMsg::Welcome {
        identity: identity.clone(),
        server_time: unix_millis(),
    });

    if let Err(e) = state.connections.register(connection.clone()) {
        error!(identity = %identity, error = %e, "Connection registration refused");
        return;
    }
    info!(identity = %identity, connection = %connection.id(), "New WebSocket connection");

    run_session(&connection, socket, outbound_rx, &state).await;

    // Only the current connection for an identity leaves its matches
    if state.connections.unregister(&connection) {
        state.lifecycle.disconnect(&identity);
    }

    info!(identity = %identity, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    connection: &Connection,
    socket: WebSocket,
    mut outbound_rx: mpsc::UnboundedReceiver<ServerMsg>,
    state: &AppState,
) {
    let identity = connection.identity().clone();
    let (mut ws_sink, mut ws_stream) = socket.split();
    let rate_limiter = PlayerRateLimiter::new();

    // Spawn writer task: outbound queue -> WebSocket
    let writer_identity = identity.clone();
    let mut writer_handle = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(identity = %writer_identity, error = %e, "WebSocket send failed");
                break;
            }
        }
        let _ = ws_sink.close().await;
    });

    // Reader loop: WebSocket -> dispatcher
    loop {
        let frame = tokio::select! {
            frame = ws_stream.next() => frame,
            _ = connection.superseded() => {
                info!(identity = %identity, "Connection superseded by a newer one");
                break;
            }
            _ = &mut writer_handle => {
                debug!(identity = %identity, "Writer finished");
                break;
            }
        };

        let Some(result) = frame else { break };
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(identity = %identity, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(client_msg) => {
                        state.dispatcher.dispatch(&identity, client_msg, unix_millis());
                    }
                    Err(e) => {
                        warn!(identity = %identity, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(identity = %identity, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                debug!(identity = %identity, "Received ping");
            }
            Ok(Message::Pong(_)) => {
                debug!(identity = %identity, "Received pong");
            }
            Ok(Message::Close(_)) => {
                info!(identity = %identity, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(identity = %identity, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
