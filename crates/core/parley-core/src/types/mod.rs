//! Core types

pub mod character;
pub mod memory;
pub mod model;
pub mod primitives;
pub mod service;
pub mod state;

pub use character::{Character, MessageExample, Style};
pub use memory::{zero_embedding, Memory, EMBEDDING_DIMENSION};
pub use model::{
    CompletionMode, CompletionRequest, ModelClass, ModelProviderName, ProviderSettings,
};
pub use primitives::{Content, CONTINUE_ACTION, UUID};
pub use service::Service;
pub use state::State;
