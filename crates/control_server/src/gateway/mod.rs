//! Chat platform gateway.
//!
//! The control service never speaks the chat platform's wire protocol itself.
//! It receives parsed [`Update`]s from a [`ChatGateway`] and hands outbound
//! messages back to it through the [`Outbox`], so that a slow platform call
//! never stalls command dispatch or node management.

pub mod outbox;
pub mod receiver;
pub mod stdio;

pub use outbox::{run_delivery, Outbox};
pub use receiver::{run_receive_loop, ReceiveBackoff};
pub use stdio::StdioGateway;

use crate::dispatch::{Update, UserId};
use crate::error::GatewayError;
use crate::pool::ChatId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Client for the external chat platform.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Waits for the next batch of updates.
    ///
    /// `Err(GatewayError::Closed)` means the update stream has ended for good;
    /// any other error is treated as transient and retried with backoff.
    async fn receive(&self) -> Result<Vec<Update>, GatewayError>;

    /// Delivers one outbound message.
    async fn deliver(&self, message: &OutboundMessage) -> Result<(), GatewayError>;

    /// Whether `user_id` administers the chat `chat_id`.
    async fn is_chat_admin(&self, chat_id: ChatId, user_id: UserId) -> Result<bool, GatewayError>;
}

/// Reply menu attached to an outbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplyMarkup {
    /// Leave whatever menu the chat currently shows
    #[default]
    None,
    /// Show a custom reply keyboard, one inner vec per row of button labels
    Keyboard { rows: Vec<Vec<String>> },
    /// Remove any custom keyboard
    ClearKeyboard,
}

/// A message the service wants delivered to a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub chat_id: ChatId,
    pub text: String,
    #[serde(default)]
    pub markup: ReplyMarkup,
    pub disable_web_page_preview: bool,
}

impl OutboundMessage {
    /// Plain text message with link previews disabled.
    pub fn text(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            markup: ReplyMarkup::None,
            disable_web_page_preview: true,
        }
    }

    /// Attaches a custom reply menu. Ignored if the menu is being cleared.
    pub fn with_menu(mut self, rows: Vec<Vec<String>>) -> Self {
        if self.markup != ReplyMarkup::ClearKeyboard {
            self.markup = ReplyMarkup::Keyboard { rows };
        }
        self
    }

    /// Requests removal of any custom menu.
    pub fn clear_menu(mut self) -> Self {
        self.markup = ReplyMarkup::ClearKeyboard;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_menu_wins_over_custom_menu() {
        let message = OutboundMessage::text(1, "hi")
            .clear_menu()
            .with_menu(vec![vec!["Yes".to_string()]]);
        assert_eq!(message.markup, ReplyMarkup::ClearKeyboard);

        let message = OutboundMessage::text(1, "hi").with_menu(vec![vec!["Yes".to_string()]]);
        assert_eq!(
            message.markup,
            ReplyMarkup::Keyboard { rows: vec![vec!["Yes".to_string()]] }
        );
        assert!(message.disable_web_page_preview);
    }
}
