//! Inbound Telegram message pipeline
//!
//! store inbound memory → classify → generate → deliver chunks → record each
//! chunk. Failures are logged and swallowed so a broken turn never reaches
//! the chat.

use crate::chunker::{send_chunked, TelegramSender};
use parley_core::memory_store::{Connection, LogEntry};
use parley_core::templates::{
    names, MESSAGE_COMPLETION_FOOTER, SHOULD_RESPOND_FOOTER, TELEGRAM_MESSAGE_HANDLER_TEMPLATE,
    TELEGRAM_SHOULD_RESPOND_TEMPLATE,
};
use parley_core::{
    now_millis, platform_uuid, AgentRuntime, Content, Logger, Memory, MessageSignals, ModelClass,
    ResponseClassifier, Result, ShouldRespond, State, CONTINUE_ACTION,
};
use std::sync::Arc;

const SOURCE: &str = "telegram";

/// Platform-neutral view of one inbound Telegram message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    /// Telegram message id
    pub message_id: i32,
    /// Chat id
    pub chat_id: i64,
    /// Sender id
    pub user_id: u64,
    /// Sender handle (falls back to the display name)
    pub user_name: String,
    /// Sender display name
    pub display_name: String,
    /// Message text
    pub text: Option<String>,
    /// Caption of a photo or document
    pub caption: Option<String>,
    /// Private chat with the bot
    pub is_private: bool,
    /// Carries a photo or document
    pub has_attachment: bool,
    /// Message this one replies to
    pub reply_to_message_id: Option<i32>,
    /// Unix time in seconds
    pub timestamp: i64,
}

impl InboundMessage {
    /// Text, or the caption when the text is missing or blank
    pub fn body(&self) -> Option<&str> {
        fn usable(field: &Option<String>) -> Option<&str> {
            field.as_deref().map(str::trim).filter(|t| !t.is_empty())
        }
        usable(&self.text).or_else(|| usable(&self.caption))
    }
}

/// Runs the response pipeline for inbound messages
pub struct MessageManager {
    runtime: Arc<AgentRuntime>,
    sender: Arc<dyn TelegramSender>,
    classifier: ResponseClassifier,
    logger: Logger,
}

impl MessageManager {
    /// Manager replying through `sender`; `bot_username` enables mention
    /// short-circuits
    pub fn new(
        runtime: Arc<AgentRuntime>,
        sender: Arc<dyn TelegramSender>,
        bot_username: Option<String>,
    ) -> Self {
        let mut classifier = runtime.classifier();
        if let Some(username) = bot_username {
            classifier = classifier.with_agent_handle(username);
        }
        Self {
            logger: runtime.logger("telegram"),
            runtime,
            sender,
            classifier,
        }
    }

    /// Handle one message, logging instead of returning failures
    pub async fn handle_message(&self, message: InboundMessage) {
        if let Err(e) = self.process(&message).await {
            self.logger.error(&format!(
                "failed to handle message {} in chat {}: {}",
                message.message_id, message.chat_id, e
            ));
        }
    }

    /// Run the pipeline; returns the memories recorded for delivered chunks
    pub async fn process(&self, message: &InboundMessage) -> Result<Vec<Memory>> {
        let Some(text) = message.body() else {
            return Ok(Vec::new());
        };

        let agent_id = self.runtime.agent_id;
        let user_id = platform_uuid(message.user_id, agent_id);
        let room_id = platform_uuid(message.chat_id, agent_id);

        self.runtime
            .store()
            .ensure_connection(&Connection {
                user_id,
                room_id,
                user_name: message.user_name.clone(),
                display_name: message.display_name.clone(),
                source: SOURCE.to_string(),
            })
            .await?;

        let mut content = Content {
            text: text.to_string(),
            source: Some(SOURCE.to_string()),
            in_reply_to: message
                .reply_to_message_id
                .map(|id| platform_uuid(id, agent_id)),
            ..Default::default()
        };
        content
            .metadata
            .insert("userName".into(), message.user_name.clone().into());

        let inbound = Memory::new(
            platform_uuid(message.message_id, agent_id),
            agent_id,
            user_id,
            room_id,
            content,
            message.timestamp * 1000,
        );
        self.runtime.store().create_memory(&inbound).await?;

        let state = self
            .runtime
            .compose_state(
                Some(&inbound),
                State::new().with_value("senderName", message.display_name.clone()),
            )
            .await?;

        if self.decide(message, text, &state).await? != ShouldRespond::Respond {
            return Ok(Vec::new());
        }

        let context = self.runtime.compose_prompt(
            names::TELEGRAM_MESSAGE_HANDLER,
            TELEGRAM_MESSAGE_HANDLER_TEMPLATE,
            Some(MESSAGE_COMPLETION_FOOTER),
            &state,
        )?;
        let response = self
            .runtime
            .generator()
            .generate_message_response(
                &context,
                ModelClass::Medium,
                self.runtime.settings.response_provider,
            )
            .await?;

        let Some(response) = response.filter(Content::has_text) else {
            self.logger.warn("no response content generated, skipping send");
            return Ok(Vec::new());
        };

        let delivery = send_chunked(
            self.sender.as_ref(),
            message.chat_id,
            &response.text,
            Some(message.message_id),
        )
        .await;

        let mut recorded = Vec::with_capacity(delivery.sent.len());
        for (i, sent) in delivery.sent.iter().enumerate() {
            let is_last = i + 1 == delivery.total;
            let memory = Memory::new(
                platform_uuid(sent.id, agent_id),
                agent_id,
                agent_id,
                room_id,
                Content {
                    text: sent.text.clone(),
                    source: Some(SOURCE.to_string()),
                    in_reply_to: Some(inbound.id),
                    action: (!is_last).then(|| CONTINUE_ACTION.to_string()),
                    ..Default::default()
                },
                if sent.timestamp > 0 {
                    sent.timestamp * 1000
                } else {
                    now_millis()
                },
            );
            self.runtime.store().create_memory(&memory).await?;
            recorded.push(memory);
        }

        self.runtime
            .store()
            .log(&LogEntry {
                user_id,
                room_id,
                kind: "response".to_string(),
                body: serde_json::json!({
                    "message": inbound.content.text,
                    "context": context,
                    "response": response.text,
                    "chunks": delivery.total,
                }),
            })
            .await?;

        if let Some(e) = delivery.error {
            return Err(e);
        }
        self.logger.debug(&format!(
            "replied in chat {} with {} chunk(s)",
            message.chat_id,
            recorded.len()
        ));
        Ok(recorded)
    }

    async fn decide(
        &self,
        message: &InboundMessage,
        text: &str,
        state: &State,
    ) -> Result<ShouldRespond> {
        let signals = MessageSignals {
            text: Some(text.to_string()),
            is_private: message.is_private,
            has_attachment: message.has_attachment,
        };
        if let Some(decision) = self.classifier.pre_classify(&signals) {
            return Ok(decision);
        }

        let context = self.runtime.compose_prompt(
            names::TELEGRAM_SHOULD_RESPOND,
            TELEGRAM_SHOULD_RESPOND_TEMPLATE,
            Some(SHOULD_RESPOND_FOOTER),
            state,
        )?;
        self.classifier.classify(&context, ModelClass::Small).await
    }
}
