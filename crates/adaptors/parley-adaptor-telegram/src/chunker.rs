//! Delivery chunker: split long replies on line boundaries and send in order

use async_trait::async_trait;
use parley_core::{ParleyError, Result};
use tracing::warn;

/// Maximum characters in one Telegram message
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// A message accepted by Telegram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Telegram message id
    pub id: i32,
    /// Text as sent
    pub text: String,
    /// Unix time in seconds
    pub timestamp: i64,
}

/// Outbound side of the Telegram Bot API
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TelegramSender: Send + Sync {
    /// Send `text` to `chat_id`, optionally as a reply to `reply_to`
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i32>,
    ) -> Result<SentMessage>;
}

/// Split `text` into chunks of at most `limit` characters.
///
/// Lines are packed greedily while `chunk + line + 1 <= limit`. A line longer
/// than `limit` is hard-split into `limit`-sized pieces first.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut current: Option<(String, usize)> = None;

    for line in text.split('\n') {
        for piece in hard_split(line, limit) {
            let piece_len = piece.chars().count();
            match current.as_mut() {
                Some((chunk, len)) if *len + piece_len + 1 <= limit => {
                    chunk.push('\n');
                    chunk.push_str(piece);
                    *len += piece_len + 1;
                }
                _ => {
                    if let Some((chunk, _)) = current.take() {
                        if !chunk.is_empty() {
                            chunks.push(chunk);
                        }
                    }
                    current = Some((piece.to_string(), piece_len));
                }
            }
        }
    }

    if let Some((chunk, _)) = current {
        if !chunk.is_empty() {
            chunks.push(chunk);
        }
    }
    chunks
}

fn hard_split(line: &str, limit: usize) -> Vec<&str> {
    if line.chars().count() <= limit {
        return vec![line];
    }
    let mut pieces = Vec::new();
    let mut rest = line;
    while !rest.is_empty() {
        let cut = rest
            .char_indices()
            .nth(limit)
            .map(|(idx, _)| idx)
            .unwrap_or(rest.len());
        let (piece, tail) = rest.split_at(cut);
        pieces.push(piece);
        rest = tail;
    }
    pieces
}

/// Result of a chunked send
#[derive(Debug, Default)]
pub struct ChunkDelivery {
    /// Chunks Telegram accepted, in order
    pub sent: Vec<SentMessage>,
    /// Number of chunks the text was split into
    pub total: usize,
    /// Failure that stopped delivery, if any
    pub error: Option<ParleyError>,
}

impl ChunkDelivery {
    /// Every chunk was delivered
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.sent.len() == self.total
    }
}

/// Send `text` as ordered chunks; only the first one replies to `reply_to`.
///
/// Delivery stops at the first failed chunk. Chunks already sent are kept in
/// the result so the caller can still record them.
pub async fn send_chunked(
    sender: &dyn TelegramSender,
    chat_id: i64,
    text: &str,
    reply_to: Option<i32>,
) -> ChunkDelivery {
    let chunks = split_message(text, TELEGRAM_MESSAGE_LIMIT);
    let mut delivery = ChunkDelivery {
        total: chunks.len(),
        ..Default::default()
    };

    for (i, chunk) in chunks.iter().enumerate() {
        let reply = if i == 0 { reply_to } else { None };
        match sender.send_message(chat_id, chunk, reply).await {
            Ok(sent) => delivery.sent.push(sent),
            Err(e) => {
                warn!(chat_id, chunk = i, error = %e, "Telegram chunk delivery failed");
                delivery.error = Some(e);
                break;
            }
        }
    }
    delivery
}
