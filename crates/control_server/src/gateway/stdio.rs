//! Line-delimited JSON gateway for running the service without a chat platform.
//!
//! Each stdin line is one [`Update`]; each outbound message is written to
//! stdout as one JSON line. Nobody is a chat admin.

use super::{ChatGateway, OutboundMessage};
use crate::dispatch::{Update, UserId};
use crate::error::GatewayError;
use crate::pool::ChatId;
use async_trait::async_trait;
use std::io::ErrorKind;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::warn;

type LineReader = Box<dyn AsyncBufRead + Send + Unpin>;
type LineWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub struct StdioGateway {
    input: Mutex<LineReader>,
    output: Mutex<LineWriter>,
}

impl StdioGateway {
    /// Reads updates from stdin and writes messages to stdout.
    pub fn new() -> Self {
        Self::from_streams(
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
        )
    }

    /// Uses arbitrary streams in place of stdin and stdout.
    pub fn from_streams(
        input: impl AsyncBufRead + Send + Unpin + 'static,
        output: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            input: Mutex::new(Box::new(input)),
            output: Mutex::new(Box::new(output)),
        }
    }
}

impl Default for StdioGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatGateway for StdioGateway {
    async fn receive(&self) -> Result<Vec<Update>, GatewayError> {
        let mut line = String::new();
        let read = match self.input.lock().await.read_line(&mut line).await {
            Ok(read) => read,
            // The bad line is consumed; the next read starts after it.
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                warn!("Skipping update line that is not valid UTF-8");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        if read == 0 {
            return Err(GatewayError::Closed);
        }

        let line = line.trim();
        if line.is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Update>(line) {
            Ok(update) => Ok(vec![update]),
            Err(e) => {
                warn!("Skipping malformed update line: {}", e);
                Ok(Vec::new())
            }
        }
    }

    async fn deliver(&self, message: &OutboundMessage) -> Result<(), GatewayError> {
        let mut payload =
            serde_json::to_string(message).map_err(|e| GatewayError::Delivery(e.to_string()))?;
        payload.push('\n');

        let mut output = self.output.lock().await;
        output.write_all(payload.as_bytes()).await?;
        output.flush().await?;
        Ok(())
    }

    async fn is_chat_admin(
        &self,
        _chat_id: ChatId,
        _user_id: UserId,
    ) -> Result<bool, GatewayError> {
        Ok(false)
    }
}
