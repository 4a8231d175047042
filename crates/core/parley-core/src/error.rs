//! Error types for the parley pipeline

use thiserror::Error;

/// Main error type for parley operations
#[derive(Debug, Error)]
pub enum ParleyError {
    /// Database operation error
    #[error("Database error: {0}")]
    Database(String),

    /// Model/LLM error
    #[error("Model error: {0}")]
    Model(String),

    /// Completion backend error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Memory operation error
    #[error("Memory error: {0}")]
    Memory(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network/HTTP error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Template rendering error
    #[error("Template error: {0}")]
    Template(String),

    /// Model output could not be parsed into the expected shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// Platform (Telegram/Twitter) API error
    #[error("Platform error: {0}")]
    Platform(String),

    /// Content generation failed after every fallback
    #[error("Generation error: {0}")]
    Generation(String),

    /// Not found error (generic)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation was cancelled through the runtime's cancellation token
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// A bounded retry policy ran out of attempts
    #[error("Retry exhausted for '{operation}' after {attempts} attempts: {last_error}")]
    RetryExhausted {
        /// Operation label
        operation: String,
        /// Number of attempts made
        attempts: usize,
        /// Last observed failure
        last_error: String,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Convenient Result type using ParleyError
pub type Result<T> = std::result::Result<T, ParleyError>;

impl ParleyError {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        ParleyError::Database(msg.into())
    }

    /// Create a model error
    pub fn model(msg: impl Into<String>) -> Self {
        ParleyError::Model(msg.into())
    }

    /// Create a provider error
    pub fn provider(msg: impl Into<String>) -> Self {
        ParleyError::Provider(msg.into())
    }

    /// Create a memory error
    pub fn memory(msg: impl Into<String>) -> Self {
        ParleyError::Memory(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        ParleyError::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        ParleyError::Validation(msg.into())
    }

    /// Create a template error
    pub fn template(msg: impl Into<String>) -> Self {
        ParleyError::Template(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        ParleyError::Parse(msg.into())
    }

    /// Create a platform error
    pub fn platform(msg: impl Into<String>) -> Self {
        ParleyError::Platform(msg.into())
    }

    /// Create a generation error
    pub fn generation(msg: impl Into<String>) -> Self {
        ParleyError::Generation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        ParleyError::NotFound(msg.into())
    }

    /// Create a cancellation error
    pub fn cancelled(msg: impl Into<String>) -> Self {
        ParleyError::Cancelled(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        ParleyError::Other(msg.into())
    }

    /// Create a retry exhausted error
    pub fn retry_exhausted(
        operation: impl Into<String>,
        attempts: usize,
        last_error: impl Into<String>,
    ) -> Self {
        ParleyError::RetryExhausted {
            operation: operation.into(),
            attempts,
            last_error: last_error.into(),
        }
    }

    /// Whether a retry loop may try again after this error.
    ///
    /// Precondition failures (bad configuration, invalid input, unknown
    /// provider) and cancellation are fatal; everything else is transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ParleyError::Config(_)
                | ParleyError::Validation(_)
                | ParleyError::Cancelled(_)
                | ParleyError::RetryExhausted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ParleyError::provider("upstream 502");
        assert_eq!(err.to_string(), "Provider error: upstream 502");

        let err = ParleyError::retry_exhausted("should_respond", 3, "timeout");
        assert_eq!(
            err.to_string(),
            "Retry exhausted for 'should_respond' after 3 attempts: timeout"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ParleyError::model("rate limited").is_retryable());
        assert!(ParleyError::parse("no label").is_retryable());
        assert!(!ParleyError::config("unknown provider").is_retryable());
        assert!(!ParleyError::cancelled("shutdown").is_retryable());
    }

    #[test]
    fn test_result_type() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }

        assert_eq!(returns_result().unwrap(), 42);
    }
}
