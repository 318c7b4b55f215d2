//! Save-policy bucket registry.
//!
//! Every registered durable object lands in exactly one of three buckets
//! per object kind: autosave-and-shutdown, shutdown-only, or uncategorized.
//! Category moves are atomic, and a root that leaves a swept bucket while
//! holding a standalone record leaves a tombstone in the matching cleanup
//! set so its record is purged by the next completed sweep.

use crate::id::PersistentId;
use crate::object::{EntityRef, ObjectSettings, PersistenceFlags, SavePolicy};
use crate::scripted::ScriptedHandle;
use crate::store::RecordType;
use std::collections::BTreeMap;

/// The three save-policy buckets for one object kind. An id appears in at
/// most one bucket at any time. Iteration order is deterministic (id order).
#[derive(Debug)]
pub struct Buckets<T> {
    pub(crate) autosave: BTreeMap<PersistentId, T>,
    pub(crate) shutdown: BTreeMap<PersistentId, T>,
    pub(crate) uncategorized: BTreeMap<PersistentId, T>,
}

impl<T> Default for Buckets<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Buckets<T> {
    pub fn new() -> Self {
        Self {
            autosave: BTreeMap::new(),
            shutdown: BTreeMap::new(),
            uncategorized: BTreeMap::new(),
        }
    }

    /// Probe in fixed precedence: autosave, then shutdown, then
    /// uncategorized.
    pub fn find(&self, id: &PersistentId) -> Option<&T> {
        self.autosave
            .get(id)
            .or_else(|| self.shutdown.get(id))
            .or_else(|| self.uncategorized.get(id))
    }

    pub fn contains(&self, id: &PersistentId) -> bool {
        self.find(id).is_some()
    }

    pub fn remove_all(&mut self, id: &PersistentId) {
        self.autosave.remove(id);
        self.shutdown.remove(id);
        self.uncategorized.remove(id);
    }

    pub fn autosave_len(&self) -> usize {
        self.autosave.len()
    }

    pub fn shutdown_len(&self) -> usize {
        self.shutdown.len()
    }

    pub fn uncategorized_len(&self) -> usize {
        self.uncategorized.len()
    }
}

/// The manager's registry: buckets for both object kinds plus the pending
/// record-cleanup sets.
#[derive(Debug, Default)]
pub struct Registry {
    pub(crate) entities: Buckets<EntityRef>,
    pub(crate) scripted: Buckets<ScriptedHandle>,

    /// Former autosave roots whose standalone records still await deletion.
    pub(crate) autosave_cleanup: BTreeMap<PersistentId, RecordType>,
    /// Former shutdown-only roots, same deal.
    pub(crate) shutdown_cleanup: BTreeMap<PersistentId, RecordType>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entities(&self) -> &Buckets<EntityRef> {
        &self.entities
    }

    pub fn scripted(&self) -> &Buckets<ScriptedHandle> {
        &self.scripted
    }

    pub fn autosave_cleanup(&self) -> &BTreeMap<PersistentId, RecordType> {
        &self.autosave_cleanup
    }

    pub fn shutdown_cleanup(&self) -> &BTreeMap<PersistentId, RecordType> {
        &self.shutdown_cleanup
    }

    /// Classify an entity per its save policy and current root status.
    ///
    /// A root under a swept policy claims its bucket (clearing any pending
    /// cleanup for the id). A non-root leaving a swept bucket lands in
    /// uncategorized and, if it holds a standalone record, tombstones the
    /// id so the record is purged on the next sweep instead of silently
    /// orphaning.
    pub fn update_entity_status(
        &mut self,
        entity: &EntityRef,
        id: &PersistentId,
        settings: &ObjectSettings,
        flags: PersistenceFlags,
        is_root: bool,
    ) {
        match settings.policy {
            SavePolicy::IntervalShutdown => {
                if is_root {
                    self.entities.uncategorized.remove(id);
                    self.autosave_cleanup.remove(id);
                    self.entities.autosave.insert(id.clone(), entity.clone());
                } else {
                    if self.entities.autosave.remove(id).is_some()
                        && flags.contains(PersistenceFlags::PERSISTENT_RECORD)
                    {
                        self.autosave_cleanup
                            .insert(id.clone(), settings.record_type.clone());
                    }
                    self.entities.uncategorized.insert(id.clone(), entity.clone());
                }
            }
            SavePolicy::ShutdownOnly => {
                if is_root {
                    self.entities.uncategorized.remove(id);
                    self.shutdown_cleanup.remove(id);
                    self.entities.shutdown.insert(id.clone(), entity.clone());
                } else {
                    if self.entities.shutdown.remove(id).is_some()
                        && flags.contains(PersistenceFlags::PERSISTENT_RECORD)
                    {
                        self.shutdown_cleanup
                            .insert(id.clone(), settings.record_type.clone());
                    }
                    self.entities.uncategorized.insert(id.clone(), entity.clone());
                }
            }
            SavePolicy::Manual => {
                self.entities.uncategorized.insert(id.clone(), entity.clone());
            }
        }
    }

    /// Bucket a scripted-state handle per its target's save policy.
    /// (Re)claiming a swept bucket clears any pending cleanup for the id.
    pub fn register_scripted(
        &mut self,
        id: &PersistentId,
        handle: ScriptedHandle,
        policy: SavePolicy,
    ) {
        match policy {
            SavePolicy::IntervalShutdown => {
                self.autosave_cleanup.remove(id);
                self.scripted.autosave.insert(id.clone(), handle);
            }
            SavePolicy::ShutdownOnly => {
                self.shutdown_cleanup.remove(id);
                self.scripted.shutdown.insert(id.clone(), handle);
            }
            SavePolicy::Manual => {
                self.scripted.uncategorized.insert(id.clone(), handle);
            }
        }
    }

    pub fn unregister_entity(&mut self, id: &PersistentId) {
        self.entities.remove_all(id);
    }

    pub fn unregister_scripted(&mut self, id: &PersistentId) {
        self.scripted.remove_all(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::DurableEntity;
    use crate::store::StoreRecord;
    use std::cell::RefCell;
    use std::rc::Rc;

    // Minimal entity: just enough state for bucket bookkeeping.
    #[derive(Debug)]
    struct Stub;

    impl DurableEntity for Stub {
        fn is_alive(&self) -> bool {
            true
        }
        fn persistent_id(&self) -> Option<&PersistentId> {
            None
        }
        fn assign_persistent_id(&mut self, _id: PersistentId) {}
        fn flags(&self) -> PersistenceFlags {
            PersistenceFlags::empty()
        }
        fn insert_flags(&mut self, _flags: PersistenceFlags) {}
        fn remove_flags(&mut self, _flags: PersistenceFlags) {}
        fn settings(&self) -> ObjectSettings {
            ObjectSettings::new(SavePolicy::Manual, RecordType::new("stub"))
        }
        fn save(&mut self) -> Option<StoreRecord> {
            None
        }
        fn load(&mut self, _record: &StoreRecord, _is_root: bool) -> bool {
            true
        }
    }

    fn stub() -> EntityRef {
        Rc::new(RefCell::new(Stub))
    }

    fn id(n: u32) -> PersistentId {
        PersistentId::new(format!("id-{n}"))
    }

    fn interval_settings() -> ObjectSettings {
        ObjectSettings::new(SavePolicy::IntervalShutdown, RecordType::new("vehicle"))
    }

    fn shutdown_settings() -> ObjectSettings {
        ObjectSettings::new(SavePolicy::ShutdownOnly, RecordType::new("bunker"))
    }

    #[test]
    fn root_with_interval_policy_lands_in_autosave() {
        let mut registry = Registry::new();
        registry.update_entity_status(
            &stub(),
            &id(1),
            &interval_settings(),
            PersistenceFlags::ROOT,
            true,
        );
        assert!(registry.entities.autosave.contains_key(&id(1)));
        assert!(!registry.entities.uncategorized.contains_key(&id(1)));
    }

    #[test]
    fn root_with_shutdown_policy_lands_in_shutdown_not_autosave() {
        let mut registry = Registry::new();
        registry.update_entity_status(
            &stub(),
            &id(1),
            &shutdown_settings(),
            PersistenceFlags::ROOT,
            true,
        );
        assert!(registry.entities.shutdown.contains_key(&id(1)));
        assert!(!registry.entities.autosave.contains_key(&id(1)));
    }

    #[test]
    fn manual_policy_always_uncategorized() {
        let mut registry = Registry::new();
        let settings = ObjectSettings::new(SavePolicy::Manual, RecordType::new("debris"));
        registry.update_entity_status(&stub(), &id(1), &settings, PersistenceFlags::ROOT, true);
        assert!(registry.entities.uncategorized.contains_key(&id(1)));
        assert!(!registry.entities.autosave.contains_key(&id(1)));
    }

    #[test]
    fn root_to_child_with_record_leaves_tombstone() {
        let mut registry = Registry::new();
        let entity = stub();
        let settings = interval_settings();

        registry.update_entity_status(&entity, &id(1), &settings, PersistenceFlags::ROOT, true);
        registry.update_entity_status(
            &entity,
            &id(1),
            &settings,
            PersistenceFlags::PERSISTENT_RECORD,
            false,
        );

        assert!(registry.entities.uncategorized.contains_key(&id(1)));
        assert!(!registry.entities.autosave.contains_key(&id(1)));
        assert_eq!(
            registry.autosave_cleanup.get(&id(1)),
            Some(&settings.record_type)
        );
        assert!(registry.shutdown_cleanup.is_empty());
    }

    #[test]
    fn root_to_child_without_record_leaves_no_tombstone() {
        let mut registry = Registry::new();
        let entity = stub();
        let settings = interval_settings();

        registry.update_entity_status(&entity, &id(1), &settings, PersistenceFlags::ROOT, true);
        registry.update_entity_status(&entity, &id(1), &settings, PersistenceFlags::empty(), false);

        assert!(registry.entities.uncategorized.contains_key(&id(1)));
        assert!(registry.autosave_cleanup.is_empty());
    }

    #[test]
    fn child_back_to_root_clears_tombstone() {
        let mut registry = Registry::new();
        let entity = stub();
        let settings = interval_settings();

        registry.update_entity_status(&entity, &id(1), &settings, PersistenceFlags::ROOT, true);
        registry.update_entity_status(
            &entity,
            &id(1),
            &settings,
            PersistenceFlags::PERSISTENT_RECORD,
            false,
        );
        registry.update_entity_status(
            &entity,
            &id(1),
            &settings,
            PersistenceFlags::ROOT | PersistenceFlags::PERSISTENT_RECORD,
            true,
        );

        assert!(registry.entities.autosave.contains_key(&id(1)));
        assert!(registry.autosave_cleanup.is_empty());
    }

    #[test]
    fn shutdown_policy_uses_its_own_cleanup_set() {
        let mut registry = Registry::new();
        let entity = stub();
        let settings = shutdown_settings();

        registry.update_entity_status(&entity, &id(1), &settings, PersistenceFlags::ROOT, true);
        registry.update_entity_status(
            &entity,
            &id(1),
            &settings,
            PersistenceFlags::PERSISTENT_RECORD,
            false,
        );

        assert_eq!(
            registry.shutdown_cleanup.get(&id(1)),
            Some(&settings.record_type)
        );
        assert!(registry.autosave_cleanup.is_empty());
    }

    #[test]
    fn id_in_at_most_one_bucket() {
        let mut registry = Registry::new();
        let entity = stub();
        let settings = interval_settings();

        registry.update_entity_status(&entity, &id(1), &settings, PersistenceFlags::ROOT, true);
        registry.update_entity_status(&entity, &id(1), &settings, PersistenceFlags::empty(), false);
        registry.update_entity_status(&entity, &id(1), &settings, PersistenceFlags::ROOT, true);

        let in_buckets = [
            registry.entities.autosave.contains_key(&id(1)),
            registry.entities.shutdown.contains_key(&id(1)),
            registry.entities.uncategorized.contains_key(&id(1)),
        ]
        .iter()
        .filter(|&&b| b)
        .count();
        assert_eq!(in_buckets, 1);
    }

    #[test]
    fn find_precedence_is_autosave_shutdown_uncategorized() {
        let mut buckets: Buckets<u32> = Buckets::new();
        buckets.uncategorized.insert(id(1), 3);
        assert_eq!(buckets.find(&id(1)), Some(&3));
        buckets.shutdown.insert(id(1), 2);
        assert_eq!(buckets.find(&id(1)), Some(&2));
        buckets.autosave.insert(id(1), 1);
        assert_eq!(buckets.find(&id(1)), Some(&1));
    }

    #[test]
    fn unregister_removes_from_all_buckets_only() {
        let mut registry = Registry::new();
        let entity = stub();
        let settings = interval_settings();

        registry.update_entity_status(&entity, &id(1), &settings, PersistenceFlags::ROOT, true);
        registry.update_entity_status(
            &entity,
            &id(1),
            &settings,
            PersistenceFlags::PERSISTENT_RECORD,
            false,
        );
        registry.unregister_entity(&id(1));

        assert!(!registry.entities.contains(&id(1)));
        // Unregistration never deletes store records; the tombstone stays
        // until a sweep drains it.
        assert!(registry.autosave_cleanup.contains_key(&id(1)));
    }

    #[test]
    fn unregister_absent_id_is_a_no_op() {
        let mut registry = Registry::new();
        registry.unregister_entity(&id(9));
        registry.unregister_scripted(&id(9));
        assert_eq!(registry.entities.autosave_len(), 0);
        assert_eq!(registry.scripted.autosave_len(), 0);
    }
}
