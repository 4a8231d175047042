//! Deterministic identifier derivation

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Create a deterministic UUID from a string
pub fn string_to_uuid(input: &str) -> Uuid {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let hash = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[0..16]);

    // Set version to 4 (random) and variant to RFC4122
    bytes[6] = (bytes[6] & 0x0F) | 0x40;
    bytes[8] = (bytes[8] & 0x3F) | 0x80;

    Uuid::from_bytes(bytes)
}

/// Identifier for a platform entity (message, tweet, chat, user) as seen by one agent.
///
/// Derived from `"<platform_id>-<agent_id>"`, so the same platform entity maps
/// to the same id across restarts but never collides between agents.
pub fn platform_uuid(platform_id: impl std::fmt::Display, agent_id: Uuid) -> Uuid {
    string_to_uuid(&format!("{}-{}", platform_id, agent_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_to_uuid_deterministic() {
        let uuid1 = string_to_uuid("test_string");
        let uuid2 = string_to_uuid("test_string");
        assert_eq!(uuid1, uuid2);
    }

    #[test]
    fn test_string_to_uuid_different() {
        assert_ne!(string_to_uuid("test1"), string_to_uuid("test2"));
    }

    #[test]
    fn test_platform_uuid_is_agent_scoped() {
        let agent_a = Uuid::new_v4();
        let agent_b = Uuid::new_v4();

        assert_eq!(platform_uuid("1834", agent_a), platform_uuid(1834, agent_a));
        assert_ne!(platform_uuid("1834", agent_a), platform_uuid("1834", agent_b));
        assert_eq!(
            platform_uuid("1834", agent_a),
            string_to_uuid(&format!("1834-{}", agent_a))
        );
    }

    #[test]
    fn test_version_bits() {
        let id = string_to_uuid("anything");
        assert_eq!(id.get_version_num(), 4);
    }
}
