use serde::{Deserialize, Serialize};

/// Authentication identity stored in redb
///
/// Bearer tokens are only honored while this record exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// When the identity was created (Unix timestamp)
    pub created_at: i64,
}

/// User id helpers
pub struct User;

impl User {
    /// Validate that a user ID is a valid SHA-256 hash (64 hex characters)
    pub fn validate_id(id: &str) -> bool {
        id.len() == 64 && id.chars().all(|c| c.is_ascii_hexdigit())
    }
}
