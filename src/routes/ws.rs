//! WebSocket handler: one player actor per connection.
//!
//! DESIGN
//! ======
//! On upgrade the connection builds a player, registers its link with the
//! hub, splits the socket, and runs two tasks:
//! - reader: text frames → `Player::handle_text`; rejections are reported
//!   back to the client as `{error, code}`
//! - writer: `PlayerMailbox::next` → JSON text frames
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → register link with hub
//! 2. Reader and writer run until one of them stops
//! 3. Reader stops first (close or read error): it unregisters, and the
//!    writer drains whatever the hub already queued until the link drops
//! 4. Writer stops first (write error): the reader is aborted and the
//!    connection unregisters on its behalf

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};

use crate::frame::{ErrorCode, ErrorKind};
use crate::services::player::{self, Player, PlayerMailbox};
use crate::state::{AppState, PlayerId};

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(socket: WebSocket, state: AppState) {
    let player_id = PlayerId::new();
    let (player, link, mailbox) = player::connect(player_id, state.hub.clone(), state.config.hub.outbound_capacity);

    if state.hub.register(link).await.is_err() {
        error!(%player_id, "ws: hub unavailable, refusing connection");
        return;
    }
    info!(%player_id, "ws: client connected");

    let (sink, stream) = socket.split();
    let mut reader = tokio::spawn(read_loop(stream, player));
    let mut writer = tokio::spawn(write_loop(sink, mailbox, player_id));

    tokio::select! {
        _ = &mut reader => {
            let _ = writer.await;
        }
        _ = &mut writer => {
            reader.abort();
            if state.hub.unregister(player_id).await.is_err() {
                debug!(%player_id, "ws: hub gone before unregister");
            }
        }
    }

    info!(%player_id, "ws: client disconnected");
}

async fn read_loop(mut stream: SplitStream<WebSocket>, player: Player) {
    let player_id = player.id();

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => {
                let Err(e) = player.handle_text(text.as_str()).await else {
                    continue;
                };
                if e.kind() == ErrorKind::Unavailable {
                    warn!(%player_id, error = %e, "ws: hub unavailable, closing");
                    break;
                }
                if e.kind() == ErrorKind::Validation {
                    warn!(%player_id, error = %e, code = e.error_code(), "ws: invalid inbound frame");
                } else {
                    debug!(%player_id, error = %e, code = e.error_code(), "ws: request rejected");
                }
                player.report(&e).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    player.disconnect().await;
}

async fn write_loop(mut sink: SplitSink<WebSocket, Message>, mut mailbox: PlayerMailbox, player_id: PlayerId) {
    while let Some(out) = mailbox.next().await {
        let json = match out.to_json() {
            Ok(json) => json,
            Err(e) => {
                error!(%player_id, error = %e, "ws: failed to encode outbound message");
                continue;
            }
        };
        if let Err(e) = sink.send(Message::Text(json.into())).await {
            debug!(%player_id, error = %e, "ws: write failed");
            return;
        }
    }

    let _ = sink.send(Message::Close(None)).await;
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
