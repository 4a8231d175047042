//! Telegram adaptor for Parley
//!
//! Inbound messages run through the shared classify / generate pipeline and
//! replies longer than a Telegram message are delivered as ordered chunks.

pub mod chunker;
pub mod client;
pub mod config;
pub mod messages;

pub use chunker::{send_chunked, split_message, ChunkDelivery, SentMessage, TelegramSender,
    TELEGRAM_MESSAGE_LIMIT};
pub use client::{TelegramClient, TeloxideSender};
pub use config::TelegramConfig;
pub use messages::{InboundMessage, MessageManager};
