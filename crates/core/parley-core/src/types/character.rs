//! Agent persona loaded from a JSON character file

use super::primitives::Content;
use crate::{ParleyError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One line of an example conversation
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageExample {
    /// Speaker name (`{{user1}}` placeholders allowed)
    pub user: String,
    /// What they said
    pub content: Content,
}

/// Style directions, split by surface
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Style {
    /// Applies everywhere
    #[serde(default)]
    pub all: Vec<String>,
    /// Chat replies only
    #[serde(default)]
    pub chat: Vec<String>,
    /// Standalone posts only
    #[serde(default)]
    pub post: Vec<String>,
}

/// Agent persona
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    /// Display name
    pub name: String,

    /// Platform handle, when it differs from the name
    #[serde(default)]
    pub username: Option<String>,

    /// System prompt sent with chat completions
    #[serde(default)]
    pub system: Option<String>,

    /// Preferred completion provider (overrides `MODEL_PROVIDER`)
    #[serde(default)]
    pub model_provider: Option<String>,

    /// Biography lines (a random subset goes into each prompt)
    #[serde(default)]
    pub bio: Vec<String>,

    /// Background lore lines
    #[serde(default)]
    pub lore: Vec<String>,

    /// Topics of interest
    #[serde(default)]
    pub topics: Vec<String>,

    /// Personality adjectives
    #[serde(default)]
    pub adjectives: Vec<String>,

    /// Example standalone posts
    #[serde(default)]
    pub post_examples: Vec<String>,

    /// Example conversations
    #[serde(default)]
    pub message_examples: Vec<Vec<MessageExample>>,

    /// Style directions
    #[serde(default)]
    pub style: Style,

    /// Prompt template overrides keyed by template name
    #[serde(default)]
    pub templates: HashMap<String, String>,
}

impl Character {
    /// Parse a character from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        let character: Character = serde_json::from_str(json)?;
        if character.name.trim().is_empty() {
            return Err(ParleyError::validation("Character name must not be empty"));
        }
        Ok(character)
    }

    /// Load a character file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ParleyError::config(format!(
                "Failed to read character file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&json)
    }

    /// Template override by name, if the character defines one
    pub fn template(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_from_json() {
        let character = Character::from_json(
            r#"{
                "name": "Rop",
                "bio": ["shitposter", "philosopher"],
                "modelProvider": "hyperbolic",
                "style": {"post": ["no emojis"]},
                "templates": {"twitterPostTemplate": "custom {{agentName}}"}
            }"#,
        )
        .unwrap();

        assert_eq!(character.name, "Rop");
        assert_eq!(character.bio.len(), 2);
        assert_eq!(character.model_provider.as_deref(), Some("hyperbolic"));
        assert_eq!(character.style.post, vec!["no emojis"]);
        assert_eq!(
            character.template("twitterPostTemplate"),
            Some("custom {{agentName}}")
        );
        assert!(character.template("missing").is_none());
    }

    #[test]
    fn test_character_requires_name() {
        assert!(matches!(
            Character::from_json(r#"{"name": "  "}"#),
            Err(ParleyError::Validation(_))
        ));
    }
}
