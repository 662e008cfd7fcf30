//! Immutable table of routable chat commands.
//!
//! Commands are declared up front with [`CommandDeclaration`] and assembled
//! into a [`CommandRegistry`] once at startup. The registry is never mutated
//! afterwards, so it is shared through an `Arc` without any locking.

use super::parse::normalize_trigger;
use crate::dispatch::Update;
use crate::error::{HandlerError, RegistryError};
use crate::server::ControlContext;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Result type returned by every command handler.
pub type HandlerResult = Result<(), HandlerError>;

/// Type-erased command handler: `(context, update, args) -> future`.
pub type CommandHandler = Arc<
    dyn Fn(Arc<ControlContext>, Update, Vec<String>) -> BoxFuture<'static, HandlerResult>
        + Send
        + Sync,
>;

/// Permission and context gates attached to a command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandFlags {
    /// Can be disabled per chat or globally by configuration
    pub blockable: bool,
    /// Only developers may run it
    pub dev_only: bool,
    /// Only global admins (or developers) may run it
    pub global_admin_only: bool,
    /// Only admins of the group (or global admins) may run it
    pub group_admin_only: bool,
    /// Only valid inside a group chat
    pub in_group_only: bool,
}

impl CommandFlags {
    /// Whether the sender's role has to be resolved before dispatch.
    pub fn requires_identity(&self) -> bool {
        self.dev_only || self.global_admin_only || self.group_admin_only
    }
}

/// A handler declaration: trigger, flags and the function to call.
///
/// # Examples
///
/// ```rust,no_run
/// use control_server::commands::{CommandDeclaration, HandlerResult};
/// use control_server::dispatch::Update;
/// use control_server::server::ControlContext;
/// use std::sync::Arc;
///
/// async fn stop(ctx: Arc<ControlContext>, update: Update, _args: Vec<String>) -> HandlerResult {
///     ctx.reply(&update, "Stopping.");
///     Ok(())
/// }
///
/// let declaration = CommandDeclaration::new("stop", stop).dev_only();
/// ```
pub struct CommandDeclaration {
    trigger: String,
    flags: CommandFlags,
    handler: CommandHandler,
}

impl CommandDeclaration {
    pub fn new<F, Fut>(trigger: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Arc<ControlContext>, Update, Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            trigger: trigger.into(),
            flags: CommandFlags::default(),
            handler: Arc::new(move |ctx, update, args| {
                Box::pin(handler(ctx, update, args))
            }),
        }
    }

    pub fn with_flags(mut self, flags: CommandFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn blockable(mut self) -> Self {
        self.flags.blockable = true;
        self
    }

    pub fn dev_only(mut self) -> Self {
        self.flags.dev_only = true;
        self
    }

    pub fn global_admin_only(mut self) -> Self {
        self.flags.global_admin_only = true;
        self
    }

    pub fn group_admin_only(mut self) -> Self {
        self.flags.group_admin_only = true;
        self
    }

    pub fn in_group_only(mut self) -> Self {
        self.flags.in_group_only = true;
        self
    }

    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    pub fn flags(&self) -> CommandFlags {
        self.flags
    }
}

/// A registered route.
#[derive(Clone)]
pub struct Command {
    trigger: String,
    flags: CommandFlags,
    handler: CommandHandler,
}

impl Command {
    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    pub fn flags(&self) -> CommandFlags {
        self.flags
    }

    /// Builds the handler future for one invocation.
    pub fn invoke(
        &self,
        context: Arc<ControlContext>,
        update: Update,
        args: Vec<String>,
    ) -> BoxFuture<'static, HandlerResult> {
        (self.handler)(context, update, args)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("trigger", &self.trigger)
            .field("flags", &self.flags)
            .field("handler", &"[handler]")
            .finish()
    }
}

/// The routing table: normalized trigger to command.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Command>,
}

impl CommandRegistry {
    pub fn builder() -> CommandRegistryBuilder {
        CommandRegistryBuilder::default()
    }

    /// Builds the table from a fixed set of declarations.
    ///
    /// # Errors
    ///
    /// * [`RegistryError::DuplicateTrigger`] if two declarations normalize to the
    ///   same trigger
    /// * [`RegistryError::InvalidTrigger`] for empty triggers, or ones containing
    ///   whitespace or `@` (which separates a trigger from the bot mention)
    pub fn build(
        declarations: impl IntoIterator<Item = CommandDeclaration>,
    ) -> Result<Self, RegistryError> {
        let mut commands = HashMap::new();

        for declaration in declarations {
            let raw = declaration.trigger.trim_start_matches('/');
            let trigger = normalize_trigger(raw);
            if trigger.is_empty() || raw.chars().any(|c| c.is_whitespace() || c == '@') {
                return Err(RegistryError::InvalidTrigger(declaration.trigger));
            }
            if commands.contains_key(&trigger) {
                return Err(RegistryError::DuplicateTrigger(trigger));
            }

            commands.insert(
                trigger.clone(),
                Command {
                    trigger,
                    flags: declaration.flags,
                    handler: declaration.handler,
                },
            );
        }

        Ok(Self { commands })
    }

    /// Finds the command for a trigger, normalizing it first.
    pub fn lookup(&self, trigger: &str) -> Option<&Command> {
        self.commands.get(&normalize_trigger(trigger))
    }

    /// Registered triggers in alphabetical order.
    pub fn triggers(&self) -> Vec<&str> {
        let mut triggers: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        triggers.sort_unstable();
        triggers
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Collects declarations before building a [`CommandRegistry`].
#[derive(Default)]
pub struct CommandRegistryBuilder {
    declarations: Vec<CommandDeclaration>,
}

impl CommandRegistryBuilder {
    pub fn command(mut self, declaration: CommandDeclaration) -> Self {
        self.declarations.push(declaration);
        self
    }

    pub fn commands(
        mut self,
        declarations: impl IntoIterator<Item = CommandDeclaration>,
    ) -> Self {
        self.declarations.extend(declarations);
        self
    }

    pub fn build(self) -> Result<CommandRegistry, RegistryError> {
        CommandRegistry::build(self.declarations)
    }
}
