//! Response classifier: RESPOND / IGNORE / STOP
//!
//! Cheap cases short-circuit without a model call. Everything else goes
//! through the gateway and is retried until the model produces a label.

use crate::gateway::CompletionGateway;
use crate::parsing::{parse_should_respond, ShouldRespond};
use crate::resilience::{retry_with_policy, RetryPolicy};
use crate::types::ModelClass;
use crate::utils::Logger;
use crate::{ParleyError, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What the classifier can tell about a message without a model
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageSignals {
    /// Text or caption
    pub text: Option<String>,
    /// Direct/private conversation
    pub is_private: bool,
    /// Carries a photo or document
    pub has_attachment: bool,
}

impl MessageSignals {
    /// Signals for a group message with text
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    fn usable_text(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

/// Decides whether the agent answers a message
pub struct ResponseClassifier {
    gateway: Arc<CompletionGateway>,
    retry: RetryPolicy,
    cancel: CancellationToken,
    agent_handle: Option<String>,
    logger: Logger,
}

impl ResponseClassifier {
    /// Classifier without a handle; mentions never short-circuit
    pub fn new(
        gateway: Arc<CompletionGateway>,
        retry: RetryPolicy,
        cancel: CancellationToken,
        logger: Logger,
    ) -> Self {
        Self {
            gateway,
            retry,
            cancel,
            agent_handle: None,
            logger,
        }
    }

    /// Platform handle checked for direct mentions (leading `@` optional)
    pub fn with_agent_handle(mut self, handle: impl Into<String>) -> Self {
        let handle = handle.into();
        let handle = handle.trim().trim_start_matches('@');
        self.agent_handle = (!handle.is_empty()).then(|| handle.to_lowercase());
        self
    }

    /// Whether `text` mentions the agent's handle
    pub fn mentions_agent(&self, text: &str) -> bool {
        match &self.agent_handle {
            Some(handle) => text.to_lowercase().contains(&format!("@{}", handle)),
            None => false,
        }
    }

    /// Decision reachable without a model call, if any
    pub fn pre_classify(&self, signals: &MessageSignals) -> Option<ShouldRespond> {
        if signals.usable_text().is_some_and(|t| self.mentions_agent(t)) {
            return Some(ShouldRespond::Respond);
        }
        if signals.is_private {
            return Some(ShouldRespond::Respond);
        }
        if signals.has_attachment {
            return Some(ShouldRespond::Ignore);
        }
        if signals.usable_text().is_none() {
            return Some(ShouldRespond::Ignore);
        }
        None
    }

    /// Ask the model for a label, retrying until one parses.
    ///
    /// An empty context is a precondition error and is never sent.
    pub async fn classify(&self, context: &str, class: ModelClass) -> Result<ShouldRespond> {
        if context.trim().is_empty() {
            return Err(ParleyError::validation(
                "should-respond context must not be empty",
            ));
        }

        let decision = retry_with_policy(&self.retry, &self.cancel, "should_respond", |attempt| {
            let gateway = self.gateway.clone();
            async move {
                let raw = gateway.complete(context, class, None).await?;
                parse_should_respond(&raw).ok_or_else(|| {
                    ParleyError::parse(format!(
                        "no response label in attempt {}: {:?}",
                        attempt,
                        raw.chars().take(80).collect::<String>()
                    ))
                })
            }
        })
        .await?;

        self.logger.debug(&format!("should respond: {}", decision));
        Ok(decision)
    }

    /// Short-circuit when possible, otherwise classify `context` at `class`
    pub async fn should_respond(
        &self,
        signals: &MessageSignals,
        context: &str,
        class: ModelClass,
    ) -> Result<ShouldRespond> {
        if let Some(decision) = self.pre_classify(signals) {
            self.logger
                .debug(&format!("should respond short-circuit: {}", decision));
            return Ok(decision);
        }
        self.classify(context, class).await
    }
}
