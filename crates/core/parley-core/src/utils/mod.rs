//! Utility functions

pub mod logger;
pub mod tokens;
pub mod uuid;

pub use logger::{init_logging, Logger};
pub use tokens::{count_tokens, trim_tokens};
pub use self::uuid::{platform_uuid, string_to_uuid};

/// Current unix time in milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Strip one pair of wrapping quotes (`"..."` or `'...'`) from model output
pub fn strip_wrapping_quotes(text: &str) -> String {
    let trimmed = text.trim();
    let mut chars = trimmed.chars();
    match (chars.next(), chars.next_back()) {
        (Some(open), Some(close))
            if matches!(open, '"' | '\'') && matches!(close, '"' | '\'') =>
        {
            chars.as_str().to_string()
        }
        _ => trimmed.to_string(),
    }
}

/// Replace literal `\n` escape sequences emitted by models with real newlines
pub fn unescape_newlines(text: &str) -> String {
    text.replace("\\n", "\n").trim().to_string()
}
