//! Inbound chat update types.
//!
//! These are the parsed events the chat gateway hands to the dispatcher. Only
//! the fields routing and permission checks need are modelled.

use crate::pool::ChatId;
use serde::{Deserialize, Serialize};

/// User identifier as issued by the chat platform.
pub type UserId = i64;

/// Kind of chat a message arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    /// Group and supergroup chats can host games.
    pub fn is_group(&self) -> bool {
        matches!(self, ChatKind::Group | ChatKind::Supergroup)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    #[serde(rename = "type")]
    pub kind: ChatKind,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: String,
}

/// A single inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub chat: Chat,
    pub from: User,
    #[serde(default)]
    pub text: Option<String>,
}

impl Update {
    /// Message text, or an empty string for non-text updates.
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat.id
    }

    pub fn sender_id(&self) -> UserId {
        self.from.id
    }

    pub fn is_group(&self) -> bool {
        self.chat.kind.is_group()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_group_update() {
        let update: Update = serde_json::from_str(
            r#"{
                "update_id": 7,
                "chat": { "id": -1001, "type": "supergroup", "title": "Village" },
                "from": { "id": 42, "username": "ana", "first_name": "Ana" },
                "text": "/startgame"
            }"#,
        )
        .unwrap();

        assert!(update.is_group());
        assert_eq!(update.chat_id(), -1001);
        assert_eq!(update.sender_id(), 42);
        assert_eq!(update.text(), "/startgame");
    }

    #[test]
    fn test_missing_text_reads_as_empty() {
        let update: Update = serde_json::from_str(
            r#"{ "update_id": 1, "chat": { "id": 5, "type": "private" }, "from": { "id": 5 } }"#,
        )
        .unwrap();

        assert!(!update.is_group());
        assert_eq!(update.text(), "");
    }
}
