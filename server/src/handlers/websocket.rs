//! WebSocket handler for document subscriptions.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use sqlx::PgPool;
use tokio::sync::mpsc;
use wordcloud_engine::DocumentId;

use crate::db;
use crate::websocket::{ClientMessage, ServerMessage, SubscriptionManager};

/// Handle an established subscription socket.
///
/// Registers the connection, sends the document as it is now, then
/// answers pings until the client goes away. Snapshots of later changes
/// arrive through the manager.
pub async fn handle_subscription(
    socket: WebSocket,
    pool: PgPool,
    subscriptions: Arc<SubscriptionManager>,
    document_id: DocumentId,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    // Register before reading so no change between the two is missed.
    let conn_id = subscriptions.register(document_id.clone(), tx);

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(text) => {
                    if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                        tracing::warn!("Failed to send WebSocket message: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize WebSocket message: {}", e);
                }
            }
        }
    });

    match db::load_document(&pool, &document_id).await {
        Ok(Some(document)) => {
            let message = ServerMessage::snapshot(
                document_id.clone(),
                document.revision,
                document.snapshot.to_fields(),
            );
            subscriptions.send_initial(&conn_id, document.revision, message);
        }
        Ok(None) => {
            let message = ServerMessage::snapshot(document_id.clone(), 0, json!({}));
            subscriptions.send_initial(&conn_id, 0, message);
        }
        Err(e) => {
            tracing::error!(conn_id = %conn_id, "Failed to load document: {:?}", e);
            subscriptions.send_to(&conn_id, ServerMessage::error("Failed to load document"));
        }
    }

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let response = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Ping) => ServerMessage::Pong,
                    Err(e) => ServerMessage::error(format!("Invalid message format: {}", e)),
                };
                subscriptions.send_to(&conn_id, response);
            }
            Ok(Message::Binary(_)) => {
                tracing::warn!("Binary messages not supported");
            }
            Ok(Message::Ping(data)) => {
                tracing::trace!("Received ping: {} bytes", data.len());
            }
            Ok(Message::Pong(_)) => {
                tracing::trace!("Received pong");
            }
            Ok(Message::Close(_)) => {
                tracing::info!(conn_id = %conn_id, "WebSocket close frame received");
                break;
            }
            Err(e) => {
                tracing::warn!(conn_id = %conn_id, "WebSocket error: {}", e);
                break;
            }
        }
    }

    subscriptions.unregister(&conn_id);
    send_task.abort();

    tracing::info!(
        conn_id = %conn_id,
        document_id = %document_id,
        active_connections = subscriptions.connection_count(),
        "Subscriber disconnected"
    );
}
