//! Telegram client: long-polls updates through teloxide and feeds them to the
//! message pipeline

use crate::chunker::{SentMessage, TelegramSender};
use crate::config::TelegramConfig;
use crate::messages::{InboundMessage, MessageManager};
use async_trait::async_trait;
use parley_core::{AgentRuntime, ParleyError, Result, Service};
use std::convert::Infallible;
use std::sync::Arc;
use teloxide::dispatching::ShutdownToken;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{Message as TelegramMessage, MessageId, ReplyParameters};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// [`TelegramSender`] backed by the Bot API
#[derive(Clone)]
pub struct TeloxideSender {
    bot: Bot,
}

impl TeloxideSender {
    /// Sender using `bot`
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl TelegramSender for TeloxideSender {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i32>,
    ) -> Result<SentMessage> {
        let mut request = self.bot.send_message(ChatId(chat_id), text);
        if let Some(id) = reply_to {
            request = request.reply_parameters(ReplyParameters::new(MessageId(id)));
        }
        let sent = request
            .await
            .map_err(|e| ParleyError::platform(format!("telegram send_message: {}", e)))?;

        Ok(SentMessage {
            id: sent.id.0,
            text: sent.text().unwrap_or(text).to_string(),
            timestamp: sent.date.timestamp(),
        })
    }
}

impl InboundMessage {
    /// Convert a teloxide message; `None` for messages sent by bots or
    /// without a sender
    pub fn from_telegram(msg: &TelegramMessage) -> Option<Self> {
        let from = msg.from.as_ref()?;
        if from.is_bot {
            return None;
        }
        let display_name = from.full_name();
        Some(Self {
            message_id: msg.id.0,
            chat_id: msg.chat.id.0,
            user_id: from.id.0,
            user_name: from.username.clone().unwrap_or_else(|| display_name.clone()),
            display_name,
            text: msg.text().map(str::to_string),
            caption: msg.caption().map(str::to_string),
            is_private: msg.chat.is_private(),
            has_attachment: msg.photo().is_some() || msg.document().is_some(),
            reply_to_message_id: msg.reply_to_message().map(|m| m.id.0),
            timestamp: msg.date.timestamp(),
        })
    }
}

/// Telegram service wired to an [`AgentRuntime`]
pub struct TelegramClient {
    config: TelegramConfig,
    runtime: Arc<AgentRuntime>,
    shutdown: Option<ShutdownToken>,
    handle: Option<JoinHandle<()>>,
}

impl TelegramClient {
    /// Client for `runtime`; nothing connects until [`Service::start`]
    pub fn new(config: TelegramConfig, runtime: Arc<AgentRuntime>) -> Self {
        Self {
            config,
            runtime,
            shutdown: None,
            handle: None,
        }
    }

    /// Client configured from the environment
    pub fn from_env(runtime: Arc<AgentRuntime>) -> Result<Self> {
        Ok(Self::new(TelegramConfig::from_env()?, runtime))
    }
}

#[async_trait]
impl Service for TelegramClient {
    fn service_type(&self) -> &str {
        "telegram"
    }

    async fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }

        let bot = Bot::new(&self.config.token);
        let me = bot
            .get_me()
            .await
            .map_err(|e| ParleyError::platform(format!("telegram get_me: {}", e)))?;
        let bot_username = me
            .user
            .username
            .clone()
            .or_else(|| self.config.bot_username.clone());
        info!(bot = ?bot_username, "Telegram bot authenticated");

        let manager = Arc::new(MessageManager::new(
            self.runtime.clone(),
            Arc::new(TeloxideSender::new(bot.clone())),
            bot_username,
        ));

        let handler = Update::filter_message().endpoint(move |msg: TelegramMessage| {
            let manager = manager.clone();
            async move {
                match InboundMessage::from_telegram(&msg) {
                    Some(inbound) => manager.handle_message(inbound).await,
                    None => debug!(message_id = msg.id.0, "Skipping message without a human sender"),
                }
                Ok::<(), Infallible>(())
            }
        });

        let mut dispatcher = Dispatcher::builder(bot, handler).build();
        let token = dispatcher.shutdown_token();
        self.shutdown = Some(token.clone());

        let cancel = self.runtime.cancel_token();
        tokio::spawn(async move {
            cancel.cancelled().await;
            if let Ok(done) = token.shutdown() {
                done.await;
            }
        });

        self.handle = Some(tokio::spawn(async move {
            dispatcher.dispatch().await;
        }));
        info!("Telegram client started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.shutdown.take() {
            match token.shutdown() {
                Ok(done) => done.await,
                Err(e) => warn!(error = %e, "Telegram dispatcher was not running"),
            }
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Telegram dispatcher task failed");
            }
        }
        info!("Telegram client stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}
