//! Versioned cache keys.

use sha2::{Digest, Sha256};
use std::fmt;

use crate::query::QueryFingerprint;
use crate::table::TableId;
use crate::version::VersionToken;

/// Separator byte between the fields folded into the digest.
const SEPARATOR: u8 = 0xFF;

/// A cache key binding a query's structure to the versions of every table
/// it reads.
///
/// # Design
///
/// The key is a SHA-256 digest over the query fingerprint followed by each
/// `(table, token)` pair in table order. Because the current version tokens
/// are baked into the digest, invalidation needs no deletion: bumping any
/// contributing table's token changes every future key, and the entries
/// stored under the old tokens simply become unreachable.
///
/// # Binary Format
///
/// The digest input is the fingerprint followed, for each pair, by
/// `[0xFF][table name][0xFF][token value: 16 bytes]`. Keys encode to
/// exactly 32 bytes and render as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    /// Assemble a key from a query fingerprint and the version tokens of
    /// the tables the query reads.
    ///
    /// Pairs are sorted by table internally, so callers may pass them in
    /// any order without affecting the result.
    pub fn assemble<'a, I>(fingerprint: &QueryFingerprint, versions: I) -> Self
    where
        I: IntoIterator<Item = (&'a TableId, &'a VersionToken)>,
    {
        let mut pairs: Vec<(&TableId, &VersionToken)> = versions.into_iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));

        let mut hasher = Sha256::new();
        hasher.update(fingerprint.as_str().as_bytes());
        for (table, token) in pairs {
            hasher.update([SEPARATOR]);
            hasher.update(table.as_str().as_bytes());
            hasher.update([SEPARATOR]);
            hasher.update(token.as_bytes());
        }

        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// The key as raw bytes, for binary storage backends.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The key rendered as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use crate::query::QuerySpec;
    use proptest::prelude::*;

    fn table_names() -> impl Strategy<Value = Vec<String>> {
        prop::collection::hash_set("[a-z]{1,8}", 1..5).prop_map(|s| s.into_iter().collect())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        /// Shuffling the (table, token) pairs never changes the key.
        #[test]
        fn prop_pair_order_irrelevant(names in table_names()) {
            let tables: Vec<TableId> = names.iter().map(TableId::new).collect();
            let tokens: Vec<VersionToken> =
                tables.iter().map(|_| VersionToken::fresh()).collect();
            let fp = QuerySpec::all(names[0].as_str()).fingerprint();

            let forward = CacheKey::assemble(&fp, tables.iter().zip(tokens.iter()));
            let reversed =
                CacheKey::assemble(&fp, tables.iter().zip(tokens.iter()).rev());
            prop_assert_eq!(forward, reversed);
        }

        /// Replacing any single token produces a different key.
        #[test]
        fn prop_any_token_change_changes_key(names in table_names(), which in any::<prop::sample::Index>()) {
            let tables: Vec<TableId> = names.iter().map(TableId::new).collect();
            let tokens: Vec<VersionToken> =
                tables.iter().map(|_| VersionToken::fresh()).collect();
            let fp = QuerySpec::all(names[0].as_str()).fingerprint();

            let before = CacheKey::assemble(&fp, tables.iter().zip(tokens.iter()));

            let mut bumped = tokens.clone();
            let idx = which.index(bumped.len());
            bumped[idx] = VersionToken::fresh();
            let after = CacheKey::assemble(&fp, tables.iter().zip(bumped.iter()));

            prop_assert_ne!(before, after);
        }
    }
}
