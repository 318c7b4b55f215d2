//! The backing store interface: a key/typed-record database with
//! create-or-update, remove, and bulk typed find.
//!
//! The store itself is an external collaborator. Amber only ever talks to
//! [`StoreAdapter`]; record payload layout is entirely the adapter's
//! concern. Writes are fire-and-forget: the manager logs failures and keeps
//! the frame moving, it never blocks on completion.

use crate::id::PersistentId;
use crate::spawner::BlueprintRef;
use serde::{Deserialize, Serialize};

/// The declared save-data type of a record, e.g. `"vehicle"` or
/// `"stockpile"`. Partitions the store's key space.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordType(String);

impl RecordType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One persisted record: declared type, unique id, and an arbitrary
/// type-specific payload. Entity records additionally carry the blueprint
/// reference they were spawned from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRecord {
    pub record_type: RecordType,
    pub id: PersistentId,
    pub blueprint: Option<BlueprintRef>,
    pub payload: serde_json::Value,
}

impl StoreRecord {
    pub fn new(record_type: RecordType, id: PersistentId, payload: serde_json::Value) -> Self {
        Self {
            record_type,
            id,
            blueprint: None,
            payload,
        }
    }

    pub fn with_blueprint(mut self, blueprint: BlueprintRef) -> Self {
        self.blueprint = Some(blueprint);
        self
    }
}

/// Errors surfaced by a store adapter. Persistence degrades per-record on
/// these; nothing escalates past a diagnostic.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend unavailable")]
    Unavailable,
    #[error("backend error: {0}")]
    Backend(String),
}

/// Async-in-spirit CRUD over typed records. Implementations may buffer
/// internally; the manager never awaits a write.
pub trait StoreAdapter {
    /// Create the record or replace the existing one with the same
    /// (type, id) key.
    fn create_or_update(&mut self, record: StoreRecord) -> Result<(), StoreError>;

    /// Remove a record by type and id. Removing an absent record is not an
    /// error.
    fn remove(&mut self, record_type: &RecordType, id: &PersistentId) -> Result<(), StoreError>;

    fn find_by_id(&self, record_type: &RecordType, id: &PersistentId) -> Option<StoreRecord>;

    /// All records of one type matching the predicate. Used for the bulk
    /// load at world init, one call per type.
    fn find_all(
        &self,
        record_type: &RecordType,
        predicate: &dyn Fn(&StoreRecord) -> bool,
    ) -> Vec<StoreRecord>;

    /// Commit any internally buffered writes. Default no-op; adapters that
    /// batch may override.
    fn flush(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_type_display_and_order() {
        let a = RecordType::new("a_first");
        let b = RecordType::new("b_second");
        assert_eq!(a.to_string(), "a_first");
        assert!(a < b);
    }

    #[test]
    fn record_serde_round_trip() {
        let record = StoreRecord::new(
            RecordType::new("vehicle"),
            PersistentId::new("0000aaaa-1111-2222-3333-444444444444"),
            serde_json::json!({ "fuel": 42.5, "crew": ["ada", "brin"] }),
        )
        .with_blueprint(BlueprintRef::new("prefabs/truck_flatbed"));

        let json = serde_json::to_string(&record).unwrap();
        let back: StoreRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert!(back.id.is_baked());
    }

    #[test]
    fn record_without_blueprint_has_none() {
        let record = StoreRecord::new(
            RecordType::new("faction_ledger"),
            PersistentId::new("x"),
            serde_json::Value::Null,
        );
        assert!(record.blueprint.is_none());
    }
}
