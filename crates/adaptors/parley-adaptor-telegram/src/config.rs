//! Telegram adaptor configuration

use parley_core::{get_env_optional, get_required_env, Result};

/// Telegram bot settings
#[derive(Clone, Default)]
pub struct TelegramConfig {
    /// Bot API token
    pub token: String,
    /// Bot username (without @), used for mention detection when the API
    /// does not report one
    pub bot_username: Option<String>,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"<redacted>")
            .field("bot_username", &self.bot_username)
            .finish()
    }
}

impl TelegramConfig {
    /// Read `TELEGRAM_BOT_TOKEN` (required) and `TELEGRAM_BOT_USERNAME`
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            token: get_required_env("TELEGRAM_BOT_TOKEN")?,
            bot_username: get_env_optional("TELEGRAM_BOT_USERNAME")
                .map(|name| name.trim_start_matches('@').to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_token() {
        let config = TelegramConfig {
            token: "123:secret".to_string(),
            bot_username: Some("rop_bot".to_string()),
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("rop_bot"));
    }
}
