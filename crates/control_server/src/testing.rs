//! Test doubles for the node transport and the chat gateway.
//!
//! Compiled for this crate's tests and, with the `testing` feature, for
//! downstream crates that test their command handlers.

use crate::commands::{CommandDeclaration, CommandRegistry};
use crate::config::ServerConfig;
use crate::dispatch::{Chat, ChatKind, Dispatcher, StaticAccessPolicy, Update, User, UserId};
use crate::error::{GatewayError, TransportError};
use crate::gateway::{ChatGateway, OutboundMessage, Outbox};
use crate::pool::{ChatId, Node, NodeId, NodePool};
use crate::server::ControlContext;
use crate::stats::ControlStats;
use crate::transport::{NodeCommand, NodeLink};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// In-memory [`NodeLink`] that records routed commands.
#[derive(Debug)]
pub struct MockNodeLink {
    connected: AtomicBool,
    routed: Mutex<Vec<NodeCommand>>,
}

impl MockNodeLink {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            routed: Mutex::new(Vec::new()),
        }
    }

    /// Simulates the connection dropping without a disconnect event.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn routed(&self) -> Vec<NodeCommand> {
        self.routed.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Default for MockNodeLink {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeLink for MockNodeLink {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn route(&self, command: NodeCommand) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Encode("mock link disconnected".to_string()));
        }
        if let Ok(mut routed) = self.routed.lock() {
            routed.push(command);
        }
        Ok(())
    }
}

/// Scripted [`ChatGateway`] that records deliveries and admin lookups.
///
/// `receive` pops scripted results in order. Once the script is empty it
/// reports the stream closed, unless [`keep_open`](Self::keep_open) was called.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    script: Mutex<VecDeque<Result<Vec<Update>, String>>>,
    keep_open: AtomicBool,
    delivered: Mutex<Vec<OutboundMessage>>,
    failing_chats: Mutex<HashSet<ChatId>>,
    admins: Mutex<HashSet<(ChatId, UserId)>>,
    admin_lookups: AtomicUsize,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_updates(&self, updates: Vec<Update>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(updates));
        }
    }

    pub fn push_error(&self, message: &str) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(message.to_string()));
        }
    }

    /// Makes an exhausted script yield empty batches instead of closing.
    pub fn keep_open(&self) {
        self.keep_open.store(true, Ordering::SeqCst);
    }

    pub fn pending_receives(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or_default()
    }

    pub fn fail_deliveries_to(&self, chat_id: ChatId) {
        if let Ok(mut failing) = self.failing_chats.lock() {
            failing.insert(chat_id);
        }
    }

    pub fn grant_admin(&self, chat_id: ChatId, user_id: UserId) {
        if let Ok(mut admins) = self.admins.lock() {
            admins.insert((chat_id, user_id));
        }
    }

    pub fn delivered(&self) -> Vec<OutboundMessage> {
        self.delivered.lock().map(|d| d.clone()).unwrap_or_default()
    }

    pub fn admin_lookups(&self) -> usize {
        self.admin_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatGateway for RecordingGateway {
    async fn receive(&self) -> Result<Vec<Update>, GatewayError> {
        let next = self.script.lock().ok().and_then(|mut script| script.pop_front());
        match next {
            Some(Ok(updates)) => Ok(updates),
            Some(Err(message)) => Err(GatewayError::Receive(message)),
            None if self.keep_open.load(Ordering::SeqCst) => {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(Vec::new())
            }
            None => Err(GatewayError::Closed),
        }
    }

    async fn deliver(&self, message: &OutboundMessage) -> Result<(), GatewayError> {
        let failing = self
            .failing_chats
            .lock()
            .map(|f| f.contains(&message.chat_id))
            .unwrap_or(false);
        if failing {
            return Err(GatewayError::Delivery(format!("chat {} unreachable", message.chat_id)));
        }
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push(message.clone());
        }
        Ok(())
    }

    async fn is_chat_admin(&self, chat_id: ChatId, user_id: UserId) -> Result<bool, GatewayError> {
        self.admin_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .admins
            .lock()
            .map(|a| a.contains(&(chat_id, user_id)))
            .unwrap_or(false))
    }
}

static NEXT_UPDATE_ID: AtomicI64 = AtomicI64::new(1);

fn update(chat: Chat, user_id: UserId, text: &str) -> Update {
    Update {
        update_id: NEXT_UPDATE_ID.fetch_add(1, Ordering::Relaxed),
        chat,
        from: User {
            id: user_id,
            username: None,
            first_name: format!("user{}", user_id),
        },
        text: Some(text.to_string()),
    }
}

/// A text message from `user_id` in the supergroup `chat_id`.
pub fn group_update(chat_id: ChatId, user_id: UserId, text: &str) -> Update {
    let chat = Chat {
        id: chat_id,
        kind: ChatKind::Supergroup,
        title: Some(format!("Group {}", chat_id)),
    };
    update(chat, user_id, text)
}

/// A text message from `user_id` in their private chat with the bot.
pub fn private_update(user_id: UserId, text: &str) -> Update {
    let chat = Chat {
        id: user_id,
        kind: ChatKind::Private,
        title: None,
    };
    update(chat, user_id, text)
}

/// A dispatcher wired to a [`RecordingGateway`], with the outbox left
/// undrained so tests can inspect exactly what was queued.
pub struct TestHarness {
    pub context: Arc<ControlContext>,
    pub dispatcher: Arc<Dispatcher>,
    pub gateway: Arc<RecordingGateway>,
    outbox_receiver: mpsc::UnboundedReceiver<OutboundMessage>,
}

impl TestHarness {
    pub fn new(commands: Vec<CommandDeclaration>) -> Self {
        Self::with_config(commands, ServerConfig::default())
    }

    /// # Panics
    ///
    /// Panics if the command table does not build.
    pub fn with_config(commands: Vec<CommandDeclaration>, config: ServerConfig) -> Self {
        let registry =
            Arc::new(CommandRegistry::build(commands).expect("test commands must build"));
        let (outbox, outbox_receiver) = Outbox::new();
        let stats = Arc::new(ControlStats::new());
        let pool = Arc::new(NodePool::new(outbox.clone(), stats.clone()));
        let context = Arc::new(ControlContext::new(pool, outbox, stats, registry));

        let gateway = Arc::new(RecordingGateway::new());
        let policy = Arc::new(StaticAccessPolicy::new(&config.access, gateway.clone()));
        let dispatcher = Arc::new(Dispatcher::new(
            context.clone(),
            policy,
            config.bot_username.clone(),
            config.access.reply_on_denied,
        ));

        Self {
            context,
            dispatcher,
            gateway,
            outbox_receiver,
        }
    }

    pub fn pool(&self) -> &Arc<NodePool> {
        self.context.pool()
    }

    /// Adds a connected mock node with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if the pool rejects the node.
    pub async fn add_node(&self, capacity: usize) -> (NodeId, Arc<MockNodeLink>) {
        let link = Arc::new(MockNodeLink::new());
        let node_id = NodeId::new();
        self.pool()
            .add_node(Node::new(node_id, link.clone(), capacity))
            .await
            .expect("fresh node must join the pool");
        (node_id, link)
    }

    /// Messages queued since the last call.
    pub fn sent(&mut self) -> Vec<OutboundMessage> {
        let mut sent = Vec::new();
        while let Ok(message) = self.outbox_receiver.try_recv() {
            sent.push(message);
        }
        sent
    }

    /// Dispatches an update and waits briefly for its handler to finish.
    pub async fn run(&self, update: Update) -> crate::dispatch::DispatchOutcome {
        let outcome = self.dispatcher.handle_update(update).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        outcome
    }
}
