//! Signaling relay over WebSocket
//!
//! Text frames (and UTF-8 binary frames) are handed to the relay connection;
//! everything the relay queues for this connection is written back as text.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use conclave_relay::{Relay, RelayConnection};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::http::AppState;

pub async fn relay_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let max_message_size = state.relay.config().max_message_size;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state.relay))
}

async fn handle_socket(socket: WebSocket, relay: Arc<Relay>) {
    let (mut connection, mut outbound) = relay.connect();
    let connection_id = connection.id().clone();
    info!(connection_id = %connection_id, "Relay connection established");

    let (mut sink, mut stream) = socket.split();

    let writer_id = connection_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if let Err(e) = sink.send(Message::Text(text.into())).await {
                debug!(connection_id = %writer_id, error = %e, "Failed to send relay message");
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => handle_frame(&mut connection, text.as_str()),
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => handle_frame(&mut connection, text),
                Err(_) => warn!(connection_id = %connection_id, "Ignoring non UTF-8 relay frame"),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(connection_id = %connection_id, error = %e, "Relay connection error");
                break;
            }
        }
    }

    let peer_id = connection.registered_as().map(str::to_string);
    drop(connection);
    writer.abort();

    info!(
        connection_id = %connection_id,
        peer_id = peer_id.as_deref().unwrap_or("-"),
        "Relay connection closed"
    );
}

fn handle_frame(connection: &mut RelayConnection, text: &str) {
    if let Err(e) = connection.handle_text(text) {
        warn!(connection_id = %connection.id(), error = %e, "Ignoring malformed relay frame");
    }
}
