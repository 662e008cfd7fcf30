//! Connection handling logic for worker nodes.
//!
//! Each accepted TCP stream is upgraded to a WebSocket, assigned a fresh
//! [`NodeId`] and announced to the server through a [`NodeEvent`] channel.
//! The handler then pumps reports from the node and commands to the node until
//! either side closes.

use super::{NodeEvent, NodeReport, WsNodeLink};
use crate::error::ServerError;
use crate::pool::NodeId;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Handles a single node connection from handshake to cleanup.
///
/// # Connection Flow
///
/// 1. Perform WebSocket handshake
/// 2. Mint a node id and a [`WsNodeLink`] for outbound commands
/// 3. Emit [`NodeEvent::Connected`]
/// 4. Run incoming (reports) and outgoing (commands) tasks until one ends
/// 5. Mark the link closed and emit [`NodeEvent::Disconnected`]
///
/// # Arguments
///
/// * `stream` - The TCP stream for the node connection
/// * `addr` - The remote address of the node
/// * `events` - Channel consumed by the server's node lifecycle loop
pub async fn handle_node_connection(
    stream: TcpStream,
    addr: SocketAddr,
    events: mpsc::UnboundedSender<NodeEvent>,
) -> Result<(), ServerError> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| ServerError::Network(format!("WebSocket handshake failed: {e}")))?;

    let (ws_sender, mut ws_receiver) = ws_stream.split();
    let ws_sender = Arc::new(Mutex::new(ws_sender));

    let node_id = NodeId::new();
    let (command_sender, mut command_receiver) = mpsc::unbounded_channel::<String>();
    let link = Arc::new(WsNodeLink::new(node_id, command_sender));

    events
        .send(NodeEvent::Connected {
            node_id,
            link: link.clone(),
            remote_addr: addr,
        })
        .map_err(|_| ServerError::Internal("node event channel closed".to_string()))?;
    info!("🔗 Node connection {} from {}", node_id, addr);

    let ws_sender_incoming = ws_sender.clone();
    let ws_sender_outgoing = ws_sender.clone();

    // Incoming task - turns node reports into lifecycle events
    let incoming_task = {
        let events = events.clone();
        async move {
            while let Some(msg) = ws_receiver.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<NodeReport>(&text) {
                        Ok(NodeReport::Hello { version }) => {
                            info!("👋 Node {} running version {}", node_id, version);
                        }
                        Ok(NodeReport::GameEnded { group_id }) => {
                            let _ = events.send(NodeEvent::GameEnded { node_id, group_id });
                        }
                        Ok(NodeReport::ShuttingDown) => {
                            let _ = events.send(NodeEvent::ShuttingDown { node_id });
                        }
                        Err(e) => {
                            warn!("Unreadable report from node {}: {}", node_id, e);
                        }
                    },
                    Ok(Message::Close(_)) => {
                        debug!("🔌 Node {} requested close", node_id);
                        break;
                    }
                    Ok(Message::Ping(data)) => {
                        let mut ws_sender = ws_sender_incoming.lock().await;
                        let _ = ws_sender.send(Message::Pong(data)).await;
                    }
                    Err(e) => {
                        error!("WebSocket error for node {}: {}", node_id, e);
                        break;
                    }
                    _ => {}
                }
            }
        }
    };

    // Outgoing task - writes queued commands to the socket
    let outgoing_task = async move {
        while let Some(payload) = command_receiver.recv().await {
            let mut ws_sender = ws_sender_outgoing.lock().await;
            if let Err(e) = ws_sender.send(Message::Text(payload.into())).await {
                error!("Failed to send command to node {}: {}", node_id, e);
                break;
            }
        }
    };

    tokio::select! {
        _ = incoming_task => {},
        _ = outgoing_task => {},
    }

    link.mark_disconnected();
    let _ = events.send(NodeEvent::Disconnected { node_id });
    Ok(())
}
