//! Persistent identity: globally unique string ids for durable objects.
//!
//! Two minting rules exist. Dynamic ids are random and collision-free.
//! Baked ids (world-authored content) are derived deterministically from an
//! authoring key so the same world layout reproduces the same ids across
//! sessions; they carry a `0000` prefix so baked status survives a round
//! trip through the store.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix shared by every id minted under the baked rule.
const BAKED_PREFIX: &str = "0000";

/// A globally unique identifier for a durable object. Assigned once at
/// registration and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PersistentId(String);

impl PersistentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id was minted under the baked (world-authored) rule.
    pub fn is_baked(&self) -> bool {
        self.0.starts_with(BAKED_PREFIX)
    }
}

impl std::fmt::Display for PersistentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mints persistent ids for one hive (one authoritative save host).
///
/// The hive id namespaces both the deterministic baked ids and the fixed id
/// under which the root entity collection is stored, so two hives writing
/// into a shared store never collide.
#[derive(Debug)]
pub struct IdGenerator {
    hive_id: u16,
    namespace: Uuid,
}

impl IdGenerator {
    pub fn new(hive_id: u16) -> Self {
        Self {
            hive_id,
            namespace: Uuid::new_v5(&Uuid::NAMESPACE_OID, &hive_id.to_be_bytes()),
        }
    }

    pub fn hive_id(&self) -> u16 {
        self.hive_id
    }

    /// Mint a random, collision-free dynamic id. Dynamic ids never carry
    /// the baked prefix; the one-in-65536 collision is re-minted.
    pub fn generate(&self) -> PersistentId {
        loop {
            let raw = Uuid::new_v4().hyphenated().to_string();
            if !raw.starts_with(BAKED_PREFIX) {
                return PersistentId(raw);
            }
        }
    }

    /// Mint a deterministic id from a world-authoring key. The same
    /// (hive, key) pair always yields the same id. Keys must be unique per
    /// world; that contract belongs to the authoring side.
    pub fn generate_baked(&self, key: &str) -> PersistentId {
        let raw = Uuid::new_v5(&self.namespace, key.as_bytes())
            .hyphenated()
            .to_string();
        // Overwrite the first hex group so the baked rule is recoverable
        // from the id alone.
        PersistentId(format!("{}{}", BAKED_PREFIX, &raw[BAKED_PREFIX.len()..]))
    }

    /// The fixed id under which this hive's root entity collection record
    /// is stored.
    pub fn root_collection_id(&self) -> PersistentId {
        PersistentId(format!(
            "00ec{:04x}-0000-0000-0000-000000000000",
            self.hive_id
        ))
    }

    /// Return the generator to its freshly-constructed state. Called when a
    /// session is torn down.
    pub fn reset(&mut self) {
        *self = Self::new(self.hive_id);
    }
}
