//! Core control server implementation.
//!
//! This module contains the main `ControlServer` struct, which wires the node
//! listener, the node pool, the command dispatcher and the chat gateway
//! together and runs them until shutdown.

use super::context::ControlContext;
use super::lifecycle::run_node_events;
use crate::commands::{CommandDeclaration, CommandRegistry};
use crate::config::ServerConfig;
use crate::dispatch::{Dispatcher, StaticAccessPolicy};
use crate::error::ServerError;
use crate::gateway::{run_delivery, run_receive_loop, ChatGateway, OutboundMessage, Outbox};
use crate::pool::NodePool;
use crate::shutdown::ShutdownState;
use crate::stats::ControlStats;
use crate::transport::handle_node_connection;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};

/// Longest the server waits for queued replies to be delivered on exit.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// The control server.
///
/// # Architecture
///
/// * **Node listener**: accepts WebSocket connections from worker nodes
/// * **Node pool**: tracks nodes and the games they host
/// * **Dispatcher**: routes chat commands to handlers through permission gates
/// * **Gateway**: receives updates and delivers queued replies
/// * **Monitor**: periodically logs pool health and counters
pub struct ControlServer {
    /// Server configuration settings
    config: ServerConfig,

    /// Chat platform client
    gateway: Arc<dyn ChatGateway>,

    /// State shared with handlers
    context: Arc<ControlContext>,

    /// Routes updates to handlers
    dispatcher: Arc<Dispatcher>,

    /// Receiving half of the outbox, taken when the server starts
    outbox_receiver: Mutex<Option<mpsc::UnboundedReceiver<OutboundMessage>>>,

    /// Channel for coordinating server shutdown
    shutdown_sender: broadcast::Sender<()>,
}

impl ControlServer {
    /// Creates a new control server.
    ///
    /// Builds the command registry and every shared component. Nothing is
    /// bound or spawned until the server is started.
    ///
    /// # Arguments
    ///
    /// * `config` - Configuration parameters for server behavior
    /// * `gateway` - Chat platform client
    /// * `commands` - The full set of command declarations
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Configuration`] if the command table is invalid.
    pub fn new(
        config: ServerConfig,
        gateway: Arc<dyn ChatGateway>,
        commands: Vec<CommandDeclaration>,
    ) -> Result<Self, ServerError> {
        let registry = Arc::new(CommandRegistry::build(commands)?);
        info!(
            "📋 Registered {} commands: {:?}",
            registry.len(),
            registry.triggers()
        );

        let (outbox, outbox_receiver) = Outbox::new();
        let stats = Arc::new(ControlStats::new());
        let pool = Arc::new(NodePool::new(outbox.clone(), stats.clone()));
        let context = Arc::new(ControlContext::new(pool, outbox, stats, registry));

        let policy = Arc::new(StaticAccessPolicy::new(&config.access, gateway.clone()));
        let dispatcher = Arc::new(Dispatcher::new(
            context.clone(),
            policy,
            config.bot_username.clone(),
            config.access.reply_on_denied,
        ));
        let (shutdown_sender, _) = broadcast::channel(1);

        Ok(Self {
            config,
            gateway,
            context,
            dispatcher,
            outbox_receiver: Mutex::new(Some(outbox_receiver)),
            shutdown_sender,
        })
    }

    /// Binds the node listener and runs until the update stream ends or
    /// shutdown is requested.
    pub async fn start(&self) -> Result<(), ServerError> {
        self.start_internal(None).await
    }

    /// Like [`start`](Self::start), but also stops once `shutdown_state`
    /// reports that shutdown has been initiated.
    pub async fn start_with_shutdown_state(
        &self,
        shutdown_state: ShutdownState,
    ) -> Result<(), ServerError> {
        self.start_internal(Some(shutdown_state)).await
    }

    async fn start_internal(
        &self,
        shutdown_state: Option<ShutdownState>,
    ) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.node_bind_address)
            .await
            .map_err(|e| {
                ServerError::Network(format!(
                    "Failed to bind {}: {}",
                    self.config.node_bind_address, e
                ))
            })?;
        self.serve(listener, shutdown_state).await
    }

    /// Runs the server on an already bound node listener.
    ///
    /// # Returns
    ///
    /// `Ok(())` when the update stream closed or shutdown was requested, or a
    /// `ServerError` if the gateway gave up or the server was already started.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown_state: Option<ShutdownState>,
    ) -> Result<(), ServerError> {
        let outbox_receiver = self
            .outbox_receiver
            .lock()
            .map_err(|_| ServerError::Internal("outbox lock poisoned".to_string()))?
            .take()
            .ok_or_else(|| ServerError::Internal("server already started".to_string()))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::Network(e.to_string()))?;
        info!("🚀 Control server accepting nodes on {}", local_addr);

        let delivery_state = shutdown_state.clone().unwrap_or_default();
        let delivery = tokio::spawn(run_delivery(
            self.gateway.clone(),
            outbox_receiver,
            delivery_state.clone(),
        ));

        let (event_sender, event_receiver) = mpsc::unbounded_channel();
        let node_events = tokio::spawn(run_node_events(
            self.context.clone(),
            self.config.clone(),
            event_receiver,
        ));
        let monitor = self.spawn_monitor();

        let accept_loop = {
            let shutdown_state = shutdown_state.clone();
            async move {
                loop {
                    if shutdown_state
                        .as_ref()
                        .is_some_and(|s| s.is_shutdown_initiated())
                    {
                        info!("🛑 Accept loop stopping - shutdown initiated");
                        break;
                    }

                    match listener.accept().await {
                        Ok((stream, addr)) => {
                            let events = event_sender.clone();
                            tokio::spawn(async move {
                                let result = handle_node_connection(stream, addr, events).await;
                                if let Err(e) = result {
                                    error!("Node connection error from {}: {}", addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept node connection: {}", e);
                            break;
                        }
                    }
                }
            }
        };

        let receive_loop = run_receive_loop(
            self.gateway.clone(),
            self.dispatcher.clone(),
            self.config.receive.clone(),
            shutdown_state.clone(),
        );

        let mut shutdown_receiver = self.shutdown_sender.subscribe();
        let mut outcome = Ok(());

        tokio::select! {
            _ = accept_loop => {}
            result = receive_loop => {
                match result {
                    Ok(()) => info!("📪 Update stream finished"),
                    Err(e) => {
                        error!("❌ Update stream failed: {}", e);
                        outcome = Err(ServerError::from(e));
                    }
                }
            }
            _ = wait_for_shutdown(shutdown_state) => {}
            _ = shutdown_receiver.recv() => {
                info!("Internal shutdown signal received");
            }
        }

        info!("🧹 Performing server cleanup...");
        if let Some(monitor) = monitor {
            monitor.abort();
        }
        node_events.abort();

        // Replies queued by the last handled updates still go out.
        delivery_state.initiate_shutdown();
        if tokio::time::timeout(FLUSH_TIMEOUT, delivery).await.is_err() {
            warn!("⏰ Outbox flush timed out, some replies may be lost");
        }
        if delivery_state.is_shutdown_complete() {
            debug!("Outbox flushed");
        }

        info!("Server stopped");
        outcome
    }

    fn spawn_monitor(&self) -> Option<tokio::task::JoinHandle<()>> {
        if self.config.stats_interval_secs == 0 {
            return None;
        }

        let context = self.context.clone();
        let period = Duration::from_secs(self.config.stats_interval_secs);
        Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let nodes = context.pool().snapshot().await;
                let games: usize = nodes.iter().map(|node| node.game_count).sum();
                let stats = context.stats().snapshot();
                info!(
                    "📊 Pool: {} node(s), {} game(s) | updates: {}, commands: {}, denied: {}",
                    nodes.len(),
                    games,
                    stats.updates_received,
                    stats.commands_dispatched,
                    stats.commands_denied
                );
                info!(
                    "📊 Games started: {}, players joined: {}, games lost: {}, nodes lost: {}",
                    stats.games_started,
                    stats.players_joined,
                    stats.games_lost,
                    stats.nodes_lost
                );
            }
        }))
    }

    /// Initiates server shutdown.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        info!("🛑 Shutting down server...");
        let _ = self.shutdown_sender.send(());
        Ok(())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn context(&self) -> Arc<ControlContext> {
        self.context.clone()
    }

    pub fn pool(&self) -> Arc<NodePool> {
        self.context.pool().clone()
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }
}

async fn wait_for_shutdown(shutdown_state: Option<ShutdownState>) {
    let Some(shutdown_state) = shutdown_state else {
        return std::future::pending().await;
    };
    shutdown_state.initiated().await;
    debug!("Shutdown observed by server");
}
