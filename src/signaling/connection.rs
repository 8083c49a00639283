#![forbid(unsafe_code)]

// WebSocket connection handler for individual clients

use super::protocol::{ClientMessage, ServerMessage};
use crate::metrics::ServerMetrics;
use crate::poker::{PlayerSender, PokerError, PokerHub};
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Bounded channel capacity per client. A room snapshot goes out on every
/// state change; messages queued beyond this are stale and dropped early.
const CHANNEL_CAPACITY: usize = 64;

/// Idle timeout — close the connection if no message arrives within this
/// duration, so dead peers don't hold connection permits indefinitely.
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

const MAX_ROOM_ID_LEN: usize = 128;
const MAX_PLAYER_NAME_LEN: usize = 64;
const MAX_CHOICE_LEN: usize = 64;

/// Serialize a ServerMessage and push it through the client's channel.
fn send_json(sender: &PlayerSender, msg: &ServerMessage) -> anyhow::Result<()> {
    let json = Arc::new(serde_json::to_string(msg)?);
    sender.try_send(json).map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(())
}

/// Handles a single WebSocket connection from accept to cleanup.
///
/// The connection identity doubles as the player identity; when the socket
/// goes away the player is removed from its room in the same step.
pub async fn handle_connection(
    socket: WebSocket,
    hub: Arc<PokerHub>,
    metrics: ServerMetrics,
    _permit: OwnedSemaphorePermit,
) {
    let conn_id = Uuid::new_v4().to_string();
    info!("New WebSocket connection: {}", conn_id);

    metrics.inc_connections_total();
    let _conn_guard = metrics.connection_active_guard();

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Bounded channel for sending messages to this client
    let (tx, mut rx) = mpsc::channel::<Arc<String>>(CHANNEL_CAPACITY);

    let conn_id_clone = conn_id.clone();
    let send_metrics = metrics.clone();

    // Spawn task to drain the channel into the socket
    let send_task = tokio::spawn(async move {
        while let Some(json) = rx.recv().await {
            send_metrics.inc_messages_sent();
            if ws_sender.send(Message::Text((*json).clone().into())).await.is_err() {
                break;
            }
        }
        debug!("Send task finished for connection: {}", conn_id_clone);
    });

    loop {
        let msg = match tokio::time::timeout(IDLE_TIMEOUT, ws_receiver.next()).await {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(_))) | Ok(None) => break, // Stream error or closed
            Err(_) => {
                warn!("Idle timeout for connection {}", conn_id);
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                metrics.inc_messages_received();

                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => {
                        let start = Instant::now();
                        let result = handle_client_message(&client_msg, &conn_id, &tx, &hub);
                        metrics.observe_message_handling(start.elapsed());

                        if let Err(e) = result {
                            debug!("Rejected message from {}: {}", conn_id, e);
                            metrics.inc_errors();
                            // If the channel is closed the send task has
                            // exited; nothing left to report to
                            if tx.is_closed() {
                                break;
                            }
                            let _ = send_json(&tx, &ServerMessage::Error {
                                message: e.to_string(),
                            });
                        }
                    }
                    Err(e) => {
                        warn!("Invalid message format from {}: {}", conn_id, e);
                        metrics.inc_errors();
                        let _ = send_json(&tx, &ServerMessage::Error {
                            message: format!("Invalid message format: {e}"),
                        });
                    }
                }
            }
            Message::Close(_) => {
                info!("Client {} closed connection", conn_id);
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                // WebSocket ping/pong handled automatically
            }
            _ => {
                warn!("Unexpected message type from client {}", conn_id);
            }
        }
    }

    // Remove the player from its room; promotes a successor or deletes the
    // room as needed
    hub.disconnect(&conn_id);

    // _conn_guard dropped here -> dec connections_active
    // _permit dropped here -> release semaphore

    drop(tx);
    if let Err(e) = send_task.await {
        error!("Send task for {} panicked: {}", conn_id, e);
    }

    info!("Connection handler finished for: {}", conn_id);
}

/// Dispatch a single client message into the hub.
///
/// Hub operations are synchronous and atomic; a returned error becomes a
/// private `error` event for this connection and nothing else changes.
fn handle_client_message(
    message: &ClientMessage,
    conn_id: &str,
    sender: &PlayerSender,
    hub: &PokerHub,
) -> Result<(), PokerError> {
    match message {
        ClientMessage::JoinRoom { room_id, player_name } => {
            if room_id.is_empty() || room_id.len() > MAX_ROOM_ID_LEN {
                return Err(PokerError::InvalidInput(format!(
                    "room id must be 1-{MAX_ROOM_ID_LEN} characters"
                )));
            }
            if player_name.len() > MAX_PLAYER_NAME_LEN {
                return Err(PokerError::InvalidInput(format!(
                    "player name must be at most {MAX_PLAYER_NAME_LEN} characters"
                )));
            }
            hub.join_room(conn_id, room_id, player_name, sender.clone())?;
        }

        ClientMessage::KickPlayer { target_id } => {
            hub.kick_player(conn_id, target_id)?;
        }

        ClientMessage::ChangeName { target_id, new_name } => {
            if new_name.len() > MAX_PLAYER_NAME_LEN {
                return Err(PokerError::InvalidInput(format!(
                    "player name must be at most {MAX_PLAYER_NAME_LEN} characters"
                )));
            }
            hub.change_name(conn_id, target_id, new_name)?;
        }

        ClientMessage::UpdateVotingStatus { target_id, can_vote } => {
            hub.update_voting_status(conn_id, target_id, *can_vote)?;
        }

        ClientMessage::TransferAdmin { target_id } => {
            hub.transfer_admin(conn_id, target_id)?;
        }

        ClientMessage::ChooseCard { choice } => {
            if choice.len() > MAX_CHOICE_LEN {
                return Err(PokerError::InvalidInput(format!(
                    "choice must be at most {MAX_CHOICE_LEN} characters"
                )));
            }
            hub.choose_card(conn_id, choice)?;
        }

        ClientMessage::AdminChangePlayerChoice { target_id, choice } => {
            if choice.len() > MAX_CHOICE_LEN {
                return Err(PokerError::InvalidInput(format!(
                    "choice must be at most {MAX_CHOICE_LEN} characters"
                )));
            }
            hub.admin_change_player_choice(conn_id, target_id, choice)?;
        }

        ClientMessage::Reset { room_id } => {
            hub.reset(conn_id, room_id)?;
        }

        ClientMessage::RevealCards { room_id } => {
            hub.reveal_cards(conn_id, room_id)?;
        }
    }

    Ok(())
}
