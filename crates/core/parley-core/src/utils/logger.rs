//! Logging utilities
//!
//! Components never install global sinks. The binary calls [`init_logging`]
//! once, and every component receives a [`Logger`] in its constructor.

use tracing::{debug, error, info, warn};

/// Namespaced logger handed to each pipeline component
#[derive(Debug, Clone)]
pub struct Logger {
    namespace: String,
}

impl Logger {
    /// Create a new logger with a namespace
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Derive a logger for a sub-component (`parent:child`)
    pub fn child(&self, name: &str) -> Self {
        Self {
            namespace: format!("{}:{}", self.namespace, name),
        }
    }

    /// Namespace this logger writes under
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Log an info message
    pub fn info(&self, message: &str) {
        info!(component = %self.namespace, "{}", message);
    }

    /// Log a debug message
    pub fn debug(&self, message: &str) {
        debug!(component = %self.namespace, "{}", message);
    }

    /// Log a warning message
    pub fn warn(&self, message: &str) {
        warn!(component = %self.namespace, "{}", message);
    }

    /// Log an error message
    pub fn error(&self, message: &str) {
        error!(component = %self.namespace, "{}", message);
    }

    /// Log a success message (info level with prefix)
    pub fn success(&self, message: &str) {
        info!(component = %self.namespace, "✓ {}", message);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new("parley")
    }
}

/// Initialize the global tracing subscriber.
///
/// Honours `RUST_LOG`, then `PARLEY_LOG_LEVEL`, defaulting to `info`.
/// Calling it twice is harmless.
pub fn init_logging() {
    let level = std::env::var("PARLEY_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_creation() {
        let logger = Logger::new("test");
        logger.info("Test info message");
        logger.debug("Test debug message");
        logger.warn("Test warning message");
        logger.error("Test error message");
        logger.success("Test success message");
    }

    #[test]
    fn test_child_namespace() {
        let logger = Logger::new("twitter").child("interactions");
        assert_eq!(logger.namespace(), "twitter:interactions");
    }
}
