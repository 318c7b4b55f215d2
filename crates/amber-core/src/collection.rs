//! The root entity collection: one persisted record per hive tracking which
//! durable entities are current top-level roots.
//!
//! This record is the single authoritative, store-level answer to "what
//! top-level objects existed". Every other record in the store is reachable
//! only by being listed here or by hanging off something that is. It is
//! loaded (or created empty) during manager post-init, mutated on every
//! root add/remove, and saved at the end of every autosave pass and every
//! shutdown save.

use crate::id::PersistentId;
use crate::object::{ObjectSettings, PersistenceFlags};
use crate::store::{RecordType, StoreAdapter, StoreRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Declared record type of the collection's own store record.
pub const ROOT_COLLECTION_TYPE: &str = "root_entity_collection";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootEntityCollection {
    /// Fixed, hive-derived id of this record.
    pub id: PersistentId,

    /// Baked roots removed in a previous session. At next world load the
    /// matching live instances are destroyed, then the entries are dropped.
    pub removed_baked_roots: BTreeSet<PersistentId>,

    /// Baked roots possibly still present as of the last load. The diff
    /// basis for future removals: only ids listed here ever migrate into
    /// `removed_baked_roots`.
    pub possible_baked_roots: BTreeSet<PersistentId>,

    /// Dynamically self-spawning roots that must be recreated from the
    /// store on next load, grouped by record type for bulk find.
    pub self_spawn_dynamic: BTreeMap<RecordType, BTreeSet<PersistentId>>,
}

impl RootEntityCollection {
    pub fn new(id: PersistentId) -> Self {
        Self {
            id,
            removed_baked_roots: BTreeSet::new(),
            possible_baked_roots: BTreeSet::new(),
            self_spawn_dynamic: BTreeMap::new(),
        }
    }

    pub fn record_type() -> RecordType {
        RecordType::new(ROOT_COLLECTION_TYPE)
    }

    /// An entity became a root. Clears any pending removal and, for
    /// self-spawning dynamic types, records the id for recreation on load.
    pub fn add(&mut self, flags: PersistenceFlags, settings: &ObjectSettings, id: &PersistentId) {
        if settings.self_spawn && !flags.contains(PersistenceFlags::BAKED) {
            self.force_self_spawn(&settings.record_type, id);
        }
        self.removed_baked_roots.remove(id);
    }

    /// An entity stopped being a root. Drops it from the self-spawn map
    /// and, if it was a known baked root, schedules the world-side removal
    /// for next load.
    pub fn remove(&mut self, flags: PersistenceFlags, settings: &ObjectSettings, id: &PersistentId) {
        if let Some(ids) = self.self_spawn_dynamic.get_mut(&settings.record_type) {
            ids.remove(id);
            if ids.is_empty() {
                self.self_spawn_dynamic.remove(&settings.record_type);
            }
        }

        if flags.contains(PersistenceFlags::BAKED) && self.possible_baked_roots.contains(id) {
            self.removed_baked_roots.insert(id.clone());
        }
    }

    /// Record an id for recreation on next load regardless of its type's
    /// default settings.
    pub fn force_self_spawn(&mut self, record_type: &RecordType, id: &PersistentId) {
        self.self_spawn_dynamic
            .entry(record_type.clone())
            .or_default()
            .insert(id.clone());
    }

    pub fn to_record(&self) -> Option<StoreRecord> {
        match serde_json::to_value(self) {
            Ok(payload) => Some(StoreRecord::new(
                Self::record_type(),
                self.id.clone(),
                payload,
            )),
            Err(err) => {
                log::error!("root entity collection serialization failed: {err}");
                None
            }
        }
    }

    pub fn from_record(record: &StoreRecord) -> Option<Self> {
        match serde_json::from_value(record.payload.clone()) {
            Ok(collection) => Some(collection),
            Err(err) => {
                log::error!(
                    "root entity collection record '{}' is unreadable: {err}",
                    record.id
                );
                None
            }
        }
    }

    /// Load the collection from the store, or start empty if no usable
    /// record exists yet.
    pub fn load_or_create(store: &dyn StoreAdapter, id: PersistentId) -> Self {
        store
            .find_by_id(&Self::record_type(), &id)
            .as_ref()
            .and_then(Self::from_record)
            .unwrap_or_else(|| Self::new(id))
    }

    /// Write the collection to the store. Failures are logged; the frame
    /// never blocks on them.
    pub fn save(&self, store: &mut dyn StoreAdapter) {
        let Some(record) = self.to_record() else {
            return;
        };
        if let Err(err) = store.create_or_update(record) {
            log::warn!("root entity collection save failed: {err}");
        }
    }
}
