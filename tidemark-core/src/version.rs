//! Version tokens for table generations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Opaque token representing one generation of a table's data.
///
/// Tokens are random (UUIDv4), never reused, and never ordered: two tokens
/// are either the same generation or different generations, nothing more.
/// The `issued_at` timestamp is diagnostic metadata only - equality,
/// hashing, and key assembly consider the random value alone, so a token
/// that travels through serialization compares equal to the original even
/// when clocks disagree.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VersionToken {
    value: Uuid,
    issued_at: DateTime<Utc>,
}

impl VersionToken {
    /// Mint a brand-new token, distinct from every token minted before.
    pub fn fresh() -> Self {
        Self {
            value: Uuid::new_v4(),
            issued_at: Utc::now(),
        }
    }

    /// The random value identifying this generation.
    pub fn value(&self) -> Uuid {
        self.value
    }

    /// When this token was minted. Diagnostic only.
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// The generation value as raw bytes, for key assembly.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.value.as_bytes()
    }
}

impl PartialEq for VersionToken {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for VersionToken {}

impl Hash for VersionToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value.simple())
    }
}
