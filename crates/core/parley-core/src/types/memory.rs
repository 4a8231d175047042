//! Memory records

use super::primitives::{Content, UUID};
use serde::{Deserialize, Serialize};

/// Dimension of the placeholder embedding stored with every memory
pub const EMBEDDING_DIMENSION: usize = 1536;

/// Zero vector stored until an embedding pass fills it in
pub fn zero_embedding() -> Vec<f32> {
    vec![0.0; EMBEDDING_DIMENSION]
}

/// A stored record of a message or post seen or produced by the agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    /// Deterministic id derived from the platform id and the agent id
    pub id: UUID,

    /// Owning agent
    pub agent_id: UUID,

    /// Author (the agent itself for outbound memories)
    pub user_id: UUID,

    /// Conversation / chat the memory belongs to
    pub room_id: UUID,

    /// Payload
    pub content: Content,

    /// Unix time in milliseconds
    pub created_at: i64,

    /// Embedding vector (zero placeholder by default)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
}

impl Memory {
    /// Build a memory with a zero embedding
    pub fn new(
        id: UUID,
        agent_id: UUID,
        user_id: UUID,
        room_id: UUID,
        content: Content,
        created_at: i64,
    ) -> Self {
        Self {
            id,
            agent_id,
            user_id,
            room_id,
            content,
            created_at,
            embedding: zero_embedding(),
        }
    }
}
