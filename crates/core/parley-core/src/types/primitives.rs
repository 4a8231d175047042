//! Primitive types shared by every pipeline stage

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// UUID type alias
pub type UUID = Uuid;

/// Action marker for every chunk of a multi-part reply except the last one
pub const CONTINUE_ACTION: &str = "CONTINUE";

/// Payload of a [`Memory`](super::Memory)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    /// Text body
    #[serde(default)]
    pub text: String,

    /// Originating platform ("telegram", "twitter")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Permalink on the originating platform
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Memory this content replies to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<UUID>,

    /// Action tag attached by the model or by the delivery layer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Any extra fields the model returned
    #[serde(flatten)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Content {
    /// Content carrying only text
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Whether the content has any non-whitespace text
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}
