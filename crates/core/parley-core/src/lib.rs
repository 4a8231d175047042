//! Parley Core
//!
//! Shared pipeline for social agents: decide whether to answer a message,
//! generate the answer, and hand it to a platform adaptor. It includes:
//!
//! - Completion gateway over any registered model backend
//! - Response classifier (RESPOND / IGNORE / STOP) with cheap short-circuits
//! - Content generator with the two-tier platform format pass
//! - Injectable retry policy, cancelable through the runtime
//! - Memory store contract with deterministic, idempotent ids
//! - Keyed JSON cache for advisory snapshots (home timeline)
//!
//! # Example
//!
//! ```no_run
//! use parley_core::*;
//! use std::sync::Arc;
//!
//! # async fn run(backend: Arc<dyn CompletionProvider>) -> Result<()> {
//! let gateway = CompletionGateway::new(ModelProviderName::OpenAi, Logger::default())
//!     .with_provider(ModelProviderName::OpenAi, backend);
//! let runtime = AgentRuntime::new(RuntimeOpts {
//!     agent_id: None,
//!     character: Character::load("characters/rop.json")?,
//!     settings: AgentSettings::from_env()?,
//!     gateway: Arc::new(gateway),
//!     store: Arc::new(InMemoryMemoryStore::new()),
//!     logger: Logger::default(),
//! });
//! let post = runtime
//!     .generator()
//!     .generate_post("# Task: write a post", ModelClass::Medium, None)
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::too_many_arguments)]

// Re-export commonly used types
pub use uuid::Uuid;

// Core modules
pub mod cache;
pub mod classifier;
pub mod config;
pub mod error;
pub mod gateway;
pub mod generator;
pub mod memory_store;
pub mod parsing;
pub mod resilience;
pub mod runtime;
pub mod templates;
pub mod testing;
pub mod types;
pub mod utils;

pub use cache::{get_or_fetch, FileCache, KeyedCache, MemoryCache};
pub use classifier::{MessageSignals, ResponseClassifier};
pub use config::{
    get_env_bool, get_env_int, get_env_optional, get_env_or, get_required_env, load_env,
    load_env_from_path, provider_settings_from_env, AgentSettings, FormatSettings,
};
pub use error::{ParleyError, Result};
pub use gateway::{CompletionGateway, CompletionOptions, CompletionProvider};
pub use generator::{fit_post_length, ContentGenerator, POST_HARD_LIMIT, POST_SOFT_LIMIT};
pub use memory_store::{Account, Connection, InMemoryMemoryStore, LogEntry, MemoryStore};
pub use parsing::{
    parse_action_response, parse_json_object, parse_should_respond, ActionResponse, ActionTag,
    ShouldRespond,
};
pub use resilience::{retry_with_policy, RetryPolicy};
pub use runtime::{AgentRuntime, RuntimeOpts, RECENT_MESSAGE_COUNT};
pub use templates::{compose_prompt_from_state, TemplateEngine};
pub use types::*;
pub use utils::{
    count_tokens, init_logging, now_millis, platform_uuid, string_to_uuid,
    strip_wrapping_quotes, trim_tokens, unescape_newlines, Logger,
};
