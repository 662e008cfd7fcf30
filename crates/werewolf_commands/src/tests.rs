use crate::builtin_commands;
use crate::handlers::admin::DRAIN_USAGE;
use crate::handlers::game::{
    ALREADY_RUNNING_MESSAGE, GAME_STARTING_MESSAGE, GAME_STOPPED_MESSAGE, NO_CAPACITY_MESSAGE,
};
use crate::handlers::{NODE_UNREACHABLE_MESSAGE, NO_GAME_MESSAGE};
use control_server::dispatch::{DenyReason, DispatchOutcome, IgnoreReason};
use control_server::gateway::ReplyMarkup;
use control_server::pool::{Node, NodeId, NodePool, NodeState};
use control_server::testing::{group_update, private_update, TestHarness};
use control_server::transport::{NodeCommand, NodeLink};
use control_server::{ServerConfig, TransportError};
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;

const DEV: i64 = 1;
const ADMIN: i64 = 2;
const GROUP: i64 = -1001;

fn harness() -> TestHarness {
    let mut config = ServerConfig::default();
    config.access.developer_ids = vec![DEV];
    config.access.global_admin_ids = vec![ADMIN];
    TestHarness::with_config(builtin_commands(), config)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_builtin_commands_build() {
    let harness = harness();
    assert_eq!(
        harness.context.registry().triggers(),
        vec![
            "drain",
            "forcestart",
            "help",
            "join",
            "nodes",
            "ping",
            "startgame",
            "stats",
            "stopgame"
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_startgame_places_game_and_announces() {
    let mut harness = harness();
    let (node_id, link) = harness.add_node(3).await;

    harness.run(group_update(GROUP, 10, "/startgame")).await;

    let routed = link.routed();
    assert_eq!(routed.len(), 1);
    match &routed[0] {
        NodeCommand::StartGame { group_id, initiator, .. } => {
            assert_eq!(*group_id, GROUP);
            assert_eq!(initiator.id, 10);
        }
        other => panic!("unexpected command {:?}", other),
    }

    let location = harness.pool().find_game(GROUP).await.unwrap();
    assert_eq!(location.node.id(), node_id);
    assert_eq!(location.game.initiator, Some(10));

    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text, GAME_STARTING_MESSAGE);
    assert_eq!(sent[0].markup, ReplyMarkup::ClearKeyboard);
    assert_eq!(harness.context.stats().snapshot().games_started, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_startgame_twice_reports_running_game() {
    let mut harness = harness();
    let (_, link) = harness.add_node(3).await;

    harness.run(group_update(GROUP, 10, "/startgame")).await;
    harness.sent();
    harness.run(group_update(GROUP, 11, "/startgame")).await;

    assert_eq!(link.routed().len(), 1);
    assert_eq!(harness.sent()[0].text, ALREADY_RUNNING_MESSAGE);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_startgame_without_capacity() {
    let mut harness = harness();
    let (node_id, _) = harness.add_node(1).await;
    harness.pool().attach_game(node_id, -5, None).await.unwrap();

    harness.run(group_update(GROUP, 10, "/startgame")).await;

    assert!(harness.pool().find_game(GROUP).await.is_none());
    assert_eq!(harness.sent()[0].text, NO_CAPACITY_MESSAGE);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_startgame_rolls_back_when_node_unreachable() {
    let mut harness = harness();
    harness
        .pool()
        .add_node(Node::new(NodeId::new(), Arc::new(FlakyLink), 3))
        .await
        .unwrap();

    harness.run(group_update(GROUP, 10, "/startgame")).await;

    assert!(harness.pool().find_game(GROUP).await.is_none());
    assert_eq!(harness.sent()[0].text, NODE_UNREACHABLE_MESSAGE);
    let stats = harness.context.stats().snapshot();
    assert_eq!(stats.handler_failures, 1);
    assert_eq!(stats.games_started, 0);
}

/// Looks alive to selection but fails every route.
#[derive(Debug)]
struct FlakyLink;

impl NodeLink for FlakyLink {
    fn is_connected(&self) -> bool {
        true
    }

    fn route(&self, _command: NodeCommand) -> Result<(), TransportError> {
        Err(TransportError::Encode("socket gone".to_string()))
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_startgame_outside_group_is_ignored() {
    let mut harness = harness();
    harness.add_node(3).await;

    let outcome = harness.run(private_update(10, "/startgame")).await;
    assert_eq!(outcome, DispatchOutcome::Ignored(IgnoreReason::OutsideGroup));
    assert!(harness.sent().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_join_routes_to_owning_node() {
    let mut harness = harness();
    let (first, first_link) = harness.add_node(3).await;
    let (_, second_link) = harness.add_node(3).await;
    harness.pool().attach_game(first, GROUP, None).await.unwrap();

    harness.run(group_update(GROUP, 20, "/join")).await;

    assert!(second_link.routed().is_empty());
    assert!(matches!(
        first_link.routed().as_slice(),
        [NodeCommand::JoinGame { group_id: GROUP, user }] if user.id == 20
    ));
    assert!(harness.sent().is_empty());
    assert_eq!(harness.context.stats().snapshot().players_joined, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_join_without_game() {
    let mut harness = harness();
    harness.run(group_update(GROUP, 20, "/join")).await;
    assert_eq!(harness.sent()[0].text, NO_GAME_MESSAGE);
    assert_eq!(harness.context.stats().snapshot().players_joined, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_forcestart_requires_group_admin() {
    let mut harness = harness();
    let (node_id, link) = harness.add_node(3).await;
    harness.pool().attach_game(node_id, GROUP, None).await.unwrap();
    harness.gateway.grant_admin(GROUP, 30);

    let outcome = harness.run(group_update(GROUP, 31, "/forcestart")).await;
    assert_eq!(outcome, DispatchOutcome::Denied(DenyReason::GroupAdminOnly));
    assert!(link.routed().is_empty());

    harness.run(group_update(GROUP, 30, "/forcestart")).await;
    harness.run(group_update(GROUP, ADMIN, "/forcestart")).await;
    assert_eq!(
        link.routed(),
        vec![
            NodeCommand::ForceStart { group_id: GROUP },
            NodeCommand::ForceStart { group_id: GROUP }
        ]
    );
    assert!(harness.sent().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stopgame_frees_the_slot() {
    let mut harness = harness();
    let (node_id, link) = harness.add_node(1).await;
    harness.pool().attach_game(node_id, GROUP, None).await.unwrap();
    assert!(harness.pool().select_best_node().await.is_none());

    harness.run(group_update(GROUP, DEV, "/stopgame")).await;

    assert_eq!(link.routed(), vec![NodeCommand::StopGame { group_id: GROUP }]);
    assert!(harness.pool().find_game(GROUP).await.is_none());
    assert!(harness.pool().select_best_node().await.is_some());
    assert_eq!(harness.sent()[0].text, GAME_STOPPED_MESSAGE);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stopgame_detaches_even_if_node_is_gone() {
    let mut harness = harness();
    let (node_id, link) = harness.add_node(1).await;
    harness.pool().attach_game(node_id, GROUP, None).await.unwrap();
    link.disconnect();

    harness.run(group_update(GROUP, DEV, "/stopgame")).await;

    assert!(harness.pool().find_game(GROUP).await.is_none());
    assert_eq!(harness.sent()[0].text, GAME_STOPPED_MESSAGE);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ping_and_help() {
    let mut harness = harness();

    harness.run(private_update(50, "/ping")).await;
    let sent = harness.sent();
    assert_eq!(sent[0].chat_id, 50);
    assert!(sent[0].text.starts_with("Pong! Uptime: "));

    harness.run(private_update(50, "/help")).await;
    let sent = harness.sent();
    assert!(sent[0].text.contains("/startgame"));
    assert!(sent[0].text.contains("/drain"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_nodes_lists_loads_for_developers_only() {
    let mut harness = harness();
    let (node_id, _) = harness.add_node(4).await;
    harness.pool().attach_game(node_id, GROUP, None).await.unwrap();

    let outcome = harness.run(private_update(ADMIN, "/nodes")).await;
    assert_eq!(outcome, DispatchOutcome::Denied(DenyReason::DeveloperOnly));
    assert!(harness.sent().is_empty());

    harness.run(private_update(DEV, "/nodes")).await;
    let sent = harness.sent();
    let text = &sent[0].text;
    assert!(text.starts_with("1 node(s):"));
    assert!(text.contains(&format!("{} active 1/4 games", node_id)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_drain_marks_node_shutting_down() {
    let mut harness = harness();
    let (node_id, _) = harness.add_node(4).await;

    harness.run(private_update(DEV, &format!("/drain {}", node_id))).await;

    assert_eq!(harness.pool().snapshot().await[0].state, NodeState::ShuttingDown);
    assert!(harness.pool().select_best_node().await.is_none());
    assert!(harness.sent()[0].text.contains("will take no new games"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_drain_rejects_bad_arguments() {
    let mut harness = harness();
    harness.add_node(4).await;

    harness.run(private_update(DEV, "/drain")).await;
    harness.run(private_update(DEV, "/drain not-a-uuid")).await;
    let sent = harness.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|m| m.text == DRAIN_USAGE));

    let unknown = NodeId::new();
    harness.run(private_update(DEV, &format!("/drain {}", unknown))).await;
    assert_eq!(harness.sent()[0].text, format!("No node with id {}.", unknown));
    assert_eq!(harness.pool().snapshot().await[0].state, NodeState::Connected);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stats_for_global_admins() {
    let mut harness = harness();
    harness.add_node(4).await;

    let outcome = harness.run(private_update(99, "/stats")).await;
    assert_eq!(outcome, DispatchOutcome::Denied(DenyReason::GlobalAdminOnly));

    harness.run(private_update(ADMIN, "/stats")).await;
    let sent = harness.sent();
    let text = &sent[0].text;
    assert!(text.contains("Nodes: 1"));
    assert!(text.contains("Commands denied: 1"));
    assert!(text.contains("Players joined: 0"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_blocked_chat_ignores_startgame() {
    let mut config = ServerConfig::default();
    config.access.blocked_chats = vec![GROUP];
    let mut harness = TestHarness::with_config(builtin_commands(), config);
    let (_, link) = harness.add_node(3).await;

    let outcome = harness.run(group_update(GROUP, 10, "/startgame")).await;
    assert_eq!(outcome, DispatchOutcome::Ignored(IgnoreReason::Blocked));
    assert!(link.routed().is_empty());
    assert!(harness.sent().is_empty());
}

/// A node that, while a command is being routed to it, drops out of the pool
/// and lets the group's game be placed on `successor` instead.
struct RelocatingLink {
    pool: Arc<NodePool>,
    own_id: NodeId,
    successor: NodeId,
    accept: bool,
}

impl fmt::Debug for RelocatingLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelocatingLink")
            .field("own_id", &self.own_id)
            .field("successor", &self.successor)
            .finish()
    }
}

impl NodeLink for RelocatingLink {
    fn is_connected(&self) -> bool {
        true
    }

    fn route(&self, _command: NodeCommand) -> Result<(), TransportError> {
        tokio::task::block_in_place(|| {
            Handle::current().block_on(async {
                self.pool.remove_node(self.own_id).await;
                self.pool
                    .attach_game(self.successor, GROUP, None)
                    .await
                    .unwrap();
            })
        });
        if self.accept {
            Ok(())
        } else {
            Err(TransportError::Encode("socket gone".to_string()))
        }
    }
}

async fn add_relocating_node(harness: &TestHarness, successor: NodeId, accept: bool) -> NodeId {
    let own_id = NodeId::new();
    let link = RelocatingLink {
        pool: harness.pool().clone(),
        own_id,
        successor,
        accept,
    };
    harness
        .pool()
        .add_node(Node::new(own_id, Arc::new(link), 3))
        .await
        .unwrap();
    own_id
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stopgame_leaves_a_relocated_game_alone() {
    let mut harness = harness();
    let (successor, _) = harness.add_node(3).await;
    let doomed = add_relocating_node(&harness, successor, true).await;
    harness.pool().attach_game(doomed, GROUP, None).await.unwrap();

    harness.run(group_update(GROUP, DEV, "/stopgame")).await;

    let location = harness.pool().find_game(GROUP).await.unwrap();
    assert_eq!(location.node.id(), successor);
    assert!(harness
        .sent()
        .iter()
        .any(|m| m.text == GAME_STOPPED_MESSAGE));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_startgame_rollback_leaves_a_relocated_game_alone() {
    let mut harness = harness();
    // A draining successor is skipped by selection but can still take a game.
    let (successor, _) = harness.add_node(3).await;
    harness.pool().mark_shutting_down(successor).await.unwrap();
    add_relocating_node(&harness, successor, false).await;

    harness.run(group_update(GROUP, 10, "/startgame")).await;

    let location = harness.pool().find_game(GROUP).await.unwrap();
    assert_eq!(location.node.id(), successor);
    assert!(harness
        .sent()
        .iter()
        .any(|m| m.text == NODE_UNREACHABLE_MESSAGE));
}
