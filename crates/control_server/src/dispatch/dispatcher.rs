//! Routes parsed commands to their handlers.

use super::access::{AccessPolicy, SenderRole};
use super::update::Update;
use crate::commands::{parse_command, Command, CommandFlags};
use crate::server::ControlContext;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Why an update produced no handler call and no reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The text is empty or a bare `/`
    NoCommand,
    /// The command was addressed to a different bot
    OtherBot,
    /// No command is registered for the trigger
    UnknownCommand,
    /// A group-only command was sent outside a group
    OutsideGroup,
    /// A blockable command is disabled for this chat
    Blocked,
}

/// Which permission gate rejected the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    DeveloperOnly,
    GlobalAdminOnly,
    GroupAdminOnly,
}

impl DenyReason {
    /// Reply text used when denials are answered.
    pub fn message(&self) -> &'static str {
        match self {
            DenyReason::DeveloperOnly => "This command is reserved for developers.",
            DenyReason::GlobalAdminOnly => "This command is reserved for bot admins.",
            DenyReason::GroupAdminOnly => "Only group admins can use this command.",
        }
    }

    fn check(flags: CommandFlags, role: SenderRole) -> Option<Self> {
        if flags.dev_only && !role.is_developer() {
            Some(DenyReason::DeveloperOnly)
        } else if flags.global_admin_only && !role.is_global_admin() {
            Some(DenyReason::GlobalAdminOnly)
        } else if flags.group_admin_only && !role.is_group_admin() {
            Some(DenyReason::GroupAdminOnly)
        } else {
            None
        }
    }
}

/// Result of routing one update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Ignored(IgnoreReason),
    Denied(DenyReason),
    /// The handler was started; its own outcome is logged separately
    Dispatched { trigger: String },
}

/// Routes updates through the registry and access policy to handlers.
///
/// Handlers run on their own tasks. A failing or panicking handler is logged
/// and counted but never affects other updates.
pub struct Dispatcher {
    context: Arc<ControlContext>,
    policy: Arc<dyn AccessPolicy>,
    bot_username: Option<String>,
    reply_on_denied: bool,
}

impl Dispatcher {
    pub fn new(
        context: Arc<ControlContext>,
        policy: Arc<dyn AccessPolicy>,
        bot_username: Option<String>,
        reply_on_denied: bool,
    ) -> Self {
        Self {
            context,
            policy,
            bot_username,
            reply_on_denied,
        }
    }

    pub fn context(&self) -> &Arc<ControlContext> {
        &self.context
    }

    /// Routes one update.
    ///
    /// Checks run in order: parse, bot mention, registry lookup, group-only,
    /// blocking, then role gates. Only a failed role gate may produce a reply.
    pub async fn handle_update(&self, update: Update) -> DispatchOutcome {
        self.context.stats().record_update();

        let Some(parsed) = parse_command(update.text()) else {
            return DispatchOutcome::Ignored(IgnoreReason::NoCommand);
        };
        if !parsed.is_addressed_to(self.bot_username.as_deref()) {
            trace!("Ignoring /{} addressed to another bot", parsed.trigger);
            return DispatchOutcome::Ignored(IgnoreReason::OtherBot);
        }

        let Some(command) = self.context.registry().lookup(&parsed.trigger).cloned() else {
            trace!("No command registered for /{}", parsed.trigger);
            return DispatchOutcome::Ignored(IgnoreReason::UnknownCommand);
        };
        let flags = command.flags();

        if flags.in_group_only && !update.is_group() {
            debug!("/{} ignored outside a group (chat {})", command.trigger(), update.chat_id());
            return DispatchOutcome::Ignored(IgnoreReason::OutsideGroup);
        }
        if flags.blockable && self.policy.is_blocked(&command, &update) {
            debug!("/{} is blocked in chat {}", command.trigger(), update.chat_id());
            return DispatchOutcome::Ignored(IgnoreReason::Blocked);
        }

        if flags.requires_identity() {
            let role = self.policy.resolve_role(&update, &command).await;
            if let Some(reason) = DenyReason::check(flags, role) {
                self.context.stats().record_denied();
                info!(
                    "🚫 User {} denied /{} in chat {} ({:?})",
                    update.sender_id(),
                    command.trigger(),
                    update.chat_id(),
                    reason
                );
                if self.reply_on_denied {
                    self.context.reply(&update, reason.message());
                }
                return DispatchOutcome::Denied(reason);
            }
        }

        self.context.stats().record_command();
        let trigger = command.trigger().to_string();
        self.spawn_handler(command, update, parsed.args);
        DispatchOutcome::Dispatched { trigger }
    }

    fn spawn_handler(&self, command: Command, update: Update, args: Vec<String>) {
        let context = self.context.clone();
        let trigger = command.trigger().to_string();
        let chat_id = update.chat_id();
        debug!("⚡ Dispatching /{} in chat {}", trigger, chat_id);

        let task = tokio::spawn(command.invoke(context.clone(), update, args));
        tokio::spawn(async move {
            match task.await {
                Ok(Ok(())) => trace!("/{} completed in chat {}", trigger, chat_id),
                Ok(Err(e)) => {
                    context.stats().record_handler_failure();
                    warn!("⚠️ /{} failed in chat {}: {}", trigger, chat_id, e);
                }
                Err(e) if e.is_panic() => {
                    context.stats().record_handler_failure();
                    error!("💥 /{} panicked in chat {}", trigger, chat_id);
                }
                Err(_) => debug!("/{} was cancelled in chat {}", trigger, chat_id),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{CommandDeclaration, HandlerResult};
    use crate::config::ServerConfig;
    use crate::error::HandlerError;
    use crate::testing::{group_update, private_update, TestHarness};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting(trigger: &str, hits: &Arc<AtomicUsize>) -> CommandDeclaration {
        let hits = hits.clone();
        CommandDeclaration::new(trigger, move |_, _, _| {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    async fn broken(_: Arc<ControlContext>, _: Update, _: Vec<String>) -> HandlerResult {
        Err(HandlerError::Other("boom".to_string()))
    }

    async fn panics(_: Arc<ControlContext>, _: Update, _: Vec<String>) -> HandlerResult {
        panic!("handler bug")
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_non_commands_and_unknown_triggers_are_ignored() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut harness = TestHarness::new(vec![counting("ping", &hits)]);

        for text in ["", "   ", "/"] {
            let outcome = harness
                .dispatcher
                .handle_update(group_update(-1, 1, text))
                .await;
            assert_eq!(outcome, DispatchOutcome::Ignored(IgnoreReason::NoCommand));
        }

        // Any first word is a trigger, with or without the slash.
        for text in ["hello there", "/unknowncmd", "unknowncmd arg1"] {
            let outcome = harness
                .dispatcher
                .handle_update(group_update(-1, 1, text))
                .await;
            assert_eq!(
                outcome,
                DispatchOutcome::Ignored(IgnoreReason::UnknownCommand)
            );
        }

        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(harness.sent().is_empty());
    }

    #[tokio::test]
    async fn test_mentions_of_other_bots_are_ignored() {
        let hits = Arc::new(AtomicUsize::new(0));
        let config = ServerConfig {
            bot_username: Some("werewolfbot".to_string()),
            ..Default::default()
        };
        let harness = TestHarness::with_config(vec![counting("ping", &hits)], config);

        let outcome = harness.dispatcher.handle_update(group_update(-1, 1, "/ping@otherbot")).await;
        assert_eq!(outcome, DispatchOutcome::Ignored(IgnoreReason::OtherBot));

        let outcome = harness
            .dispatcher
            .handle_update(group_update(-1, 1, "/ping@WerewolfBot"))
            .await;
        assert!(matches!(outcome, DispatchOutcome::Dispatched { .. }));

        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_group_only_command_in_private_chat() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut harness = TestHarness::new(vec![counting("startgame", &hits).in_group_only()]);

        let outcome = harness.dispatcher.handle_update(private_update(5, "/startgame")).await;
        assert_eq!(outcome, DispatchOutcome::Ignored(IgnoreReason::OutsideGroup));

        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(harness.sent().is_empty());
    }

    #[tokio::test]
    async fn test_blocked_command_is_silently_dropped() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut config = ServerConfig::default();
        config.access.blocked_chats = vec![-42];
        let mut harness =
            TestHarness::with_config(vec![counting("startgame", &hits).blockable()], config);

        let outcome = harness.dispatcher.handle_update(group_update(-42, 5, "/startgame")).await;
        assert_eq!(outcome, DispatchOutcome::Ignored(IgnoreReason::Blocked));

        let outcome = harness.dispatcher.handle_update(group_update(-43, 5, "/startgame")).await;
        assert!(matches!(outcome, DispatchOutcome::Dispatched { .. }));

        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(harness.sent().is_empty());
    }

    #[tokio::test]
    async fn test_role_gates() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut config = ServerConfig::default();
        config.access.developer_ids = vec![1];
        config.access.global_admin_ids = vec![2];
        let harness = TestHarness::with_config(
            vec![
                counting("nodes", &hits).dev_only(),
                counting("stats", &hits).global_admin_only(),
                counting("forcestart", &hits).group_admin_only().in_group_only(),
            ],
            config,
        );
        harness.gateway.grant_admin(-10, 3);

        let cases = [
            (1, "/nodes", true),
            (2, "/nodes", false),
            (1, "/stats", true),
            (2, "/stats", true),
            (3, "/stats", false),
            (2, "/forcestart", true),
            (3, "/forcestart", true),
            (4, "/forcestart", false),
        ];
        for (user, text, allowed) in cases {
            let outcome = harness.dispatcher.handle_update(group_update(-10, user, text)).await;
            assert_eq!(
                matches!(outcome, DispatchOutcome::Dispatched { .. }),
                allowed,
                "user {} running {}",
                user,
                text
            );
        }

        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 5);
        assert_eq!(harness.context.stats().snapshot().commands_denied, 3);
    }

    #[tokio::test]
    async fn test_denial_reply_is_optional() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut harness = TestHarness::new(vec![counting("nodes", &hits).dev_only()]);
        let outcome = harness.dispatcher.handle_update(private_update(9, "/nodes")).await;
        assert_eq!(outcome, DispatchOutcome::Denied(DenyReason::DeveloperOnly));
        assert!(harness.sent().is_empty());

        let mut config = ServerConfig::default();
        config.access.reply_on_denied = true;
        let mut harness =
            TestHarness::with_config(vec![counting("nodes", &hits).dev_only()], config);
        harness.dispatcher.handle_update(private_update(9, "/nodes")).await;

        let sent = harness.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chat_id, 9);
        assert_eq!(sent[0].text, DenyReason::DeveloperOnly.message());
    }

    #[tokio::test]
    async fn test_failing_handlers_do_not_affect_others() {
        let hits = Arc::new(AtomicUsize::new(0));
        let harness = TestHarness::new(vec![
            counting("ping", &hits),
            CommandDeclaration::new("broken", broken),
            CommandDeclaration::new("panics", panics),
        ]);

        harness.dispatcher.handle_update(group_update(-1, 1, "/broken")).await;
        harness.dispatcher.handle_update(group_update(-1, 1, "/panics")).await;
        harness.dispatcher.handle_update(group_update(-1, 1, "/ping")).await;

        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let stats = harness.context.stats().snapshot();
        assert_eq!(stats.commands_dispatched, 3);
        assert_eq!(stats.handler_failures, 2);
    }

    #[tokio::test]
    async fn test_handler_receives_arguments() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let harness = TestHarness::new(vec![CommandDeclaration::new("echo", move |_, _, args| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().extend(args);
                Ok(())
            }
        })]);

        harness.dispatcher.handle_update(group_update(-1, 1, "/ECHO one  two")).await;
        settle().await;
        assert_eq!(*seen.lock().unwrap(), vec!["one", "two"]);
    }
}
