//! Parsers for structured model output
//!
//! Three shapes come back from the models:
//! - a response label (`[RESPOND]`, `[IGNORE]`, `[STOP]`)
//! - a JSON reply object, usually inside a fenced ```json block
//! - action tags for a timeline post: `[LIKE]`, `[RETWEET]`, `[QUOTE]`,
//!   `[QUOTE: text]`, `[REPLY]`, `[REPLY: text]`, `[MEME: concept]`
//!
//! Tags are case insensitive, may appear in any order and several may share a
//! line. Payloads run to the closing bracket, so they cannot contain `]`.

use crate::{ParleyError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Decision of the response classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShouldRespond {
    /// Generate and send a reply
    Respond,
    /// Stay silent for this message
    Ignore,
    /// Stop participating in the conversation
    Stop,
}

impl std::fmt::Display for ShouldRespond {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShouldRespond::Respond => write!(f, "RESPOND"),
            ShouldRespond::Ignore => write!(f, "IGNORE"),
            ShouldRespond::Stop => write!(f, "STOP"),
        }
    }
}

/// Parse a response label.
///
/// The first line is checked for an exact (bracket-insensitive) label; failing
/// that, the first label mentioned anywhere wins in RESPOND, IGNORE, STOP order.
pub fn parse_should_respond(text: &str) -> Option<ShouldRespond> {
    let first_line = text
        .lines()
        .next()
        .unwrap_or("")
        .replace(['[', ']'], "")
        .trim()
        .to_uppercase();

    match first_line.as_str() {
        "RESPOND" => return Some(ShouldRespond::Respond),
        "IGNORE" => return Some(ShouldRespond::Ignore),
        "STOP" => return Some(ShouldRespond::Stop),
        _ => {}
    }

    let upper = text.to_uppercase();
    if upper.contains("RESPOND") {
        Some(ShouldRespond::Respond)
    } else if upper.contains("IGNORE") {
        Some(ShouldRespond::Ignore)
    } else if upper.contains("STOP") {
        Some(ShouldRespond::Stop)
    } else {
        None
    }
}

fn fenced_block() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("fenced block pattern is valid")
    })
}

/// Extract a JSON object from model output.
///
/// Prefers a fenced code block, then the outermost `{ ... }` span.
pub fn parse_json_object(text: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    let candidate = match fenced_block().captures(text) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(""),
        None => {
            let start = text.find('{')?;
            let end = text.rfind('}')?;
            if end < start {
                return None;
            }
            &text[start..=end]
        }
    };

    match serde_json::from_str::<serde_json::Value>(candidate.trim()) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// One engagement action on a timeline post
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionTag {
    /// Like the post
    Like,
    /// Repost without comment
    Retweet,
    /// Repost with generated commentary
    Quote,
    /// Text reply
    Reply,
    /// Image reply or standalone image post
    Meme,
}

impl std::fmt::Display for ActionTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionTag::Like => write!(f, "like"),
            ActionTag::Retweet => write!(f, "retweet"),
            ActionTag::Quote => write!(f, "quote"),
            ActionTag::Reply => write!(f, "reply"),
            ActionTag::Meme => write!(f, "meme"),
        }
    }
}

/// Parsed action tags; text-bearing actions carry their optional payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    /// `[LIKE]` present
    pub like: bool,
    /// `[RETWEET]` present
    pub retweet: bool,
    /// `[QUOTE]` present, with payload text (may be empty)
    pub quote: Option<String>,
    /// `[REPLY]` present, with payload text (may be empty)
    pub reply: Option<String>,
    /// `[MEME: concept]` present, with the concept (may be empty)
    pub meme: Option<String>,
}

impl ActionResponse {
    /// Set of requested actions
    pub fn requested(&self) -> BTreeSet<ActionTag> {
        let mut tags = BTreeSet::new();
        if self.like {
            tags.insert(ActionTag::Like);
        }
        if self.retweet {
            tags.insert(ActionTag::Retweet);
        }
        if self.quote.is_some() {
            tags.insert(ActionTag::Quote);
        }
        if self.reply.is_some() {
            tags.insert(ActionTag::Reply);
        }
        if self.meme.is_some() {
            tags.insert(ActionTag::Meme);
        }
        tags
    }

    /// No action requested
    pub fn is_empty(&self) -> bool {
        self.requested().is_empty()
    }

    /// Render back into the tag grammar, one tag per line
    pub fn render(&self) -> String {
        fn tag(name: &str, payload: &str) -> String {
            let payload = payload.trim();
            if payload.is_empty() {
                format!("[{}]", name)
            } else {
                format!("[{}: {}]", name, payload)
            }
        }

        let mut lines = Vec::new();
        if self.like {
            lines.push("[LIKE]".to_string());
        }
        if self.retweet {
            lines.push("[RETWEET]".to_string());
        }
        if let Some(text) = &self.quote {
            lines.push(tag("QUOTE", text));
        }
        if let Some(text) = &self.reply {
            lines.push(tag("REPLY", text));
        }
        if let Some(concept) = &self.meme {
            lines.push(tag("MEME", concept));
        }
        lines.join("\n")
    }
}

fn action_tag() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\[\s*(LIKE|RETWEET|QUOTE|REPLY|MEME)\s*(?::([^\]]*))?\]")
            .expect("action tag pattern is valid")
    })
}

/// Parse action tags.
///
/// Empty output is a parse error; non-empty output without tags is a valid
/// "no action" response. When a tag repeats, the first payload wins.
pub fn parse_action_response(text: &str) -> Result<ActionResponse> {
    if text.trim().is_empty() {
        return Err(ParleyError::parse("empty action response"));
    }

    let mut actions = ActionResponse::default();
    for caps in action_tag().captures_iter(text) {
        let name = caps[1].to_uppercase();
        let payload = caps
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();

        match name.as_str() {
            "LIKE" => actions.like = true,
            "RETWEET" => actions.retweet = true,
            "QUOTE" => {
                actions.quote.get_or_insert(payload);
            }
            "REPLY" => {
                actions.reply.get_or_insert(payload);
            }
            "MEME" => {
                actions.meme.get_or_insert(payload);
            }
            _ => {}
        }
    }
    Ok(actions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_respond_first_line() {
        assert_eq!(parse_should_respond("[RESPOND]"), Some(ShouldRespond::Respond));
        assert_eq!(parse_should_respond("  ignore \n"), Some(ShouldRespond::Ignore));
        assert_eq!(parse_should_respond("[STOP]\nbecause"), Some(ShouldRespond::Stop));
    }

    #[test]
    fn test_should_respond_fallback_search() {
        assert_eq!(
            parse_should_respond("I think Rop should [IGNORE] this one"),
            Some(ShouldRespond::Ignore)
        );
        assert_eq!(parse_should_respond("no idea"), None);
        assert_eq!(parse_should_respond(""), None);
    }

    #[test]
    fn test_parse_json_object_fenced() {
        let text = "Sure!\n```json\n{ \"user\": \"Rop\", \"text\": \"gm\", \"action\": \"NONE\" }\n```";
        let obj = parse_json_object(text).unwrap();
        assert_eq!(obj["text"], "gm");
        assert_eq!(obj["action"], "NONE");
    }

    #[test]
    fn test_parse_json_object_bare_and_invalid() {
        assert_eq!(parse_json_object("reply: {\"text\": \"hi\"} done").unwrap()["text"], "hi");
        assert!(parse_json_object("```json\n[1, 2]\n```").is_none());
        assert!(parse_json_object("no json here").is_none());
        assert!(parse_json_object("} backwards {").is_none());
    }

    #[test]
    fn test_parse_actions_mixed_case_and_payloads() {
        let actions =
            parse_action_response("[like]\n[REPLY: based take]  [Meme: cat in a suit]").unwrap();
        assert!(actions.like);
        assert!(!actions.retweet);
        assert_eq!(actions.reply.as_deref(), Some("based take"));
        assert_eq!(actions.meme.as_deref(), Some("cat in a suit"));
        assert_eq!(
            actions.requested().into_iter().collect::<Vec<_>>(),
            vec![ActionTag::Like, ActionTag::Reply, ActionTag::Meme]
        );
    }

    #[test]
    fn test_parse_actions_no_tags_is_empty_not_error() {
        let actions = parse_action_response("nothing worth doing").unwrap();
        assert!(actions.is_empty());
        assert!(matches!(
            parse_action_response("   "),
            Err(ParleyError::Parse(_))
        ));
    }

    #[test]
    fn test_render_then_parse_preserves_actions() {
        let actions = ActionResponse {
            like: true,
            retweet: true,
            quote: Some(String::new()),
            reply: Some("nah this is the way".to_string()),
            meme: Some("distracted boyfriend but it's gas fees".to_string()),
        };

        let rendered = actions.render();
        assert_eq!(parse_action_response(&rendered).unwrap(), actions);
    }
}
