//! Applies node transport events to the pool.

use super::context::ControlContext;
use crate::config::ServerConfig;
use crate::pool::Node;
use crate::transport::NodeEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Applies a single node event.
///
/// # Arguments
///
/// * `context` - Pool, outbox and counters to update
/// * `config` - Supplies the capacity for new nodes and the operator chat
/// * `event` - The transport event
///
/// Lost nodes and games are counted by the pool itself, whether the node is
/// removed here or swept earlier during selection.
pub async fn apply_node_event(context: &ControlContext, config: &ServerConfig, event: NodeEvent) {
    let pool = context.pool();

    match event {
        NodeEvent::Connected {
            node_id,
            link,
            remote_addr,
        } => {
            let node = Node::new(node_id, link, config.max_games_per_node);
            match pool.add_node(node).await {
                Ok(()) => notify_operator(
                    context,
                    config,
                    format!("Node {} connected from {}.", node_id, remote_addr),
                ),
                Err(e) => warn!("⚠️ Rejected node {} from {}: {}", node_id, remote_addr, e),
            }
        }
        NodeEvent::Disconnected { node_id } => {
            let notice = match pool.remove_node(node_id).await {
                Some(evicted) if !evicted.is_empty() => {
                    warn!(
                        "💀 Node {} disconnected with {} active game(s)",
                        node_id,
                        evicted.len()
                    );
                    format!(
                        "Node {} disconnected, {} game(s) lost.",
                        node_id,
                        evicted.len()
                    )
                }
                // Already swept, or idle when it left
                _ => format!("Node {} disconnected.", node_id),
            };
            notify_operator(context, config, notice);
        }
        NodeEvent::GameEnded { node_id, group_id } => {
            match pool.release_game(node_id, group_id).await {
                Some(_) => info!("🏁 Game in group {} ended on node {}", group_id, node_id),
                None => debug!(
                    "Ignoring end-of-game for group {} from node {} (not its owner)",
                    group_id, node_id
                ),
            }
        }
        NodeEvent::ShuttingDown { node_id } => {
            if let Err(e) = pool.mark_shutting_down(node_id).await {
                debug!("Shutdown notice from unknown node {}: {}", node_id, e);
            }
        }
    }
}

fn notify_operator(context: &ControlContext, config: &ServerConfig, text: String) {
    if let Some(chat_id) = config.operator_chat_id {
        context.outbox().send_text(chat_id, text);
    }
}

/// Drains the node event channel until every transport handle is gone.
pub async fn run_node_events(
    context: Arc<ControlContext>,
    config: ServerConfig,
    mut events: mpsc::UnboundedReceiver<NodeEvent>,
) {
    while let Some(event) = events.recv().await {
        apply_node_event(&context, &config, event).await;
    }
    debug!("Node event channel closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{NodeId, NodeState, NODE_LOST_MESSAGE};
    use crate::testing::{MockNodeLink, TestHarness};
    use std::net::SocketAddr;

    fn addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 40000))
    }

    fn connected(node_id: NodeId) -> NodeEvent {
        NodeEvent::Connected {
            node_id,
            link: Arc::new(MockNodeLink::new()),
            remote_addr: addr(),
        }
    }

    #[tokio::test]
    async fn test_node_lifecycle_events() {
        let mut harness = TestHarness::new(Vec::new());
        let config = ServerConfig {
            max_games_per_node: 10,
            ..Default::default()
        };
        let context = harness.context.clone();
        let pool = context.pool();
        let node_id = NodeId::new();

        apply_node_event(&context, &config, connected(node_id)).await;
        assert_eq!(pool.len().await, 1);
        assert_eq!(pool.snapshot().await[0].capacity, 10);

        pool.attach_game(node_id, -1, None).await.unwrap();
        pool.attach_game(node_id, -2, None).await.unwrap();

        let ended = NodeEvent::GameEnded {
            node_id,
            group_id: -1,
        };
        apply_node_event(&context, &config, ended).await;
        assert!(pool.find_game(-1).await.is_none());

        apply_node_event(&context, &config, NodeEvent::ShuttingDown { node_id }).await;
        assert_eq!(pool.snapshot().await[0].state, NodeState::ShuttingDown);

        apply_node_event(&context, &config, NodeEvent::Disconnected { node_id }).await;
        assert!(pool.is_empty().await);
        let stats = context.stats().snapshot();
        assert_eq!(stats.games_lost, 1);
        assert_eq!(stats.nodes_lost, 1);

        // No operator chat configured: only the group notice goes out
        let sent = harness.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chat_id, -2);
        assert_eq!(sent[0].text, NODE_LOST_MESSAGE);
    }

    #[tokio::test]
    async fn test_operator_chat_hears_about_nodes() {
        let mut harness = TestHarness::new(Vec::new());
        let config = ServerConfig {
            operator_chat_id: Some(-900),
            ..Default::default()
        };
        let context = harness.context.clone();
        let node_id = NodeId::new();

        apply_node_event(&context, &config, connected(node_id)).await;
        context.pool().attach_game(node_id, -3, None).await.unwrap();
        apply_node_event(&context, &config, NodeEvent::Disconnected { node_id }).await;

        let sent = harness.sent();
        let operator: Vec<&str> = sent
            .iter()
            .filter(|message| message.chat_id == -900)
            .map(|message| message.text.as_str())
            .collect();
        assert_eq!(operator.len(), 2);
        assert!(operator[0].contains("connected from 127.0.0.1:40000"));
        assert!(operator[1].contains("1 game(s) lost"));
        assert!(sent.iter().any(|message| message.chat_id == -3));
    }

    #[tokio::test]
    async fn test_disconnect_after_sweep_is_counted_once() {
        let mut harness = TestHarness::new(Vec::new());
        let config = ServerConfig {
            operator_chat_id: Some(-900),
            ..Default::default()
        };
        let context = harness.context.clone();
        let (node_id, link) = harness.add_node(5).await;
        context.pool().attach_game(node_id, -4, None).await.unwrap();

        link.disconnect();
        assert!(context.pool().select_best_node().await.is_none());
        apply_node_event(&context, &config, NodeEvent::Disconnected { node_id }).await;

        let stats = context.stats().snapshot();
        assert_eq!(stats.nodes_lost, 1);
        assert_eq!(stats.games_lost, 1);

        let sent = harness.sent();
        assert_eq!(sent.iter().filter(|m| m.chat_id == -4).count(), 1);
        assert!(sent
            .iter()
            .any(|m| m.chat_id == -900 && m.text.ends_with("disconnected.")));
    }

    #[tokio::test]
    async fn test_game_end_from_wrong_node_is_ignored() {
        let harness = TestHarness::new(Vec::new());
        let config = ServerConfig::default();
        let context = harness.context.clone();
        let (owner, _) = harness.add_node(5).await;
        context.pool().attach_game(owner, -7, None).await.unwrap();

        let stray = NodeEvent::GameEnded {
            node_id: NodeId::new(),
            group_id: -7,
        };
        apply_node_event(&context, &config, stray).await;
        assert!(context.pool().find_game(-7).await.is_some());
    }
}
