//! Shared test fixtures for unit tests, integration tests, and examples.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so the helpers
//! are available to this crate's tests and, via the `test-utils` feature,
//! to the integration-test crate.

use crate::id::PersistentId;
use crate::object::{DurableEntity, EntityRef, ObjectSettings, PersistenceFlags, SavePolicy};
use crate::scripted::{ScriptedRef, ScriptedState};
use crate::spawner::{BlueprintRef, Spawner};
use crate::store::{RecordType, StoreAdapter, StoreError, StoreRecord};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

/// Record type used by [`TestEntity`].
pub const TEST_ENTITY_TYPE: &str = "test_entity";

/// Record type used by [`TestScriptedState`].
pub const TEST_SCRIPTED_TYPE: &str = "scripted_state";

// ===========================================================================
// In-memory store
// ===========================================================================

/// Reference store adapter: typed records in nested maps, plus a log of
/// every remove ever issued (for cleanup-set assertions).
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: BTreeMap<RecordType, BTreeMap<PersistentId, StoreRecord>>,
    removed: Vec<(RecordType, PersistentId)>,
    writes: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_count(&self) -> usize {
        self.records.values().map(|m| m.len()).sum()
    }

    pub fn get(&self, record_type: &RecordType, id: &PersistentId) -> Option<StoreRecord> {
        self.records.get(record_type)?.get(id).cloned()
    }

    /// Every remove issued against this store, in order, including removes
    /// of records that did not exist.
    pub fn removed(&self) -> Vec<(RecordType, PersistentId)> {
        self.removed.clone()
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }
}

impl StoreAdapter for MemoryStore {
    fn create_or_update(&mut self, record: StoreRecord) -> Result<(), StoreError> {
        self.writes += 1;
        self.records
            .entry(record.record_type.clone())
            .or_default()
            .insert(record.id.clone(), record);
        Ok(())
    }

    fn remove(&mut self, record_type: &RecordType, id: &PersistentId) -> Result<(), StoreError> {
        if let Some(records) = self.records.get_mut(record_type) {
            records.remove(id);
        }
        self.removed.push((record_type.clone(), id.clone()));
        Ok(())
    }

    fn find_by_id(&self, record_type: &RecordType, id: &PersistentId) -> Option<StoreRecord> {
        self.get(record_type, id)
    }

    fn find_all(
        &self,
        record_type: &RecordType,
        predicate: &dyn Fn(&StoreRecord) -> bool,
    ) -> Vec<StoreRecord> {
        self.records
            .get(record_type)
            .map(|records| records.values().filter(|r| predicate(r)).cloned().collect())
            .unwrap_or_default()
    }
}

/// A cloneable handle onto one [`MemoryStore`], so a test can hand the
/// manager a store connection and keep inspecting it — or carry the same
/// store across a simulated session restart.
#[derive(Debug, Clone, Default)]
pub struct SharedStore(Rc<RefCell<MemoryStore>>);

impl SharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_count(&self) -> usize {
        self.0.borrow().record_count()
    }

    pub fn get(&self, record_type: &RecordType, id: &PersistentId) -> Option<StoreRecord> {
        self.0.borrow().get(record_type, id)
    }

    pub fn removed(&self) -> Vec<(RecordType, PersistentId)> {
        self.0.borrow().removed()
    }

    pub fn writes(&self) -> u64 {
        self.0.borrow().writes()
    }
}

impl StoreAdapter for SharedStore {
    fn create_or_update(&mut self, record: StoreRecord) -> Result<(), StoreError> {
        self.0.borrow_mut().create_or_update(record)
    }

    fn remove(&mut self, record_type: &RecordType, id: &PersistentId) -> Result<(), StoreError> {
        self.0.borrow_mut().remove(record_type, id)
    }

    fn find_by_id(&self, record_type: &RecordType, id: &PersistentId) -> Option<StoreRecord> {
        self.0.borrow().find_by_id(record_type, id)
    }

    fn find_all(
        &self,
        record_type: &RecordType,
        predicate: &dyn Fn(&StoreRecord) -> bool,
    ) -> Vec<StoreRecord> {
        self.0.borrow().find_all(record_type, predicate)
    }
}

// ===========================================================================
// Test entity
// ===========================================================================

/// Instrumented durable entity: counts saves and loads, can be killed or
/// told to fail loading.
#[derive(Debug)]
pub struct TestEntity {
    pub alive: bool,
    pub id: Option<PersistentId>,
    pub flags: PersistenceFlags,
    pub settings: ObjectSettings,
    pub authoring_key: Option<String>,
    pub blueprint: Option<BlueprintRef>,
    pub save_count: u32,
    pub load_count: u32,
    pub loaded_payloads: Vec<serde_json::Value>,
    pub fail_load: bool,
}

impl TestEntity {
    pub fn new(policy: SavePolicy) -> Self {
        Self {
            alive: true,
            id: None,
            flags: PersistenceFlags::empty(),
            settings: ObjectSettings::new(policy, RecordType::new(TEST_ENTITY_TYPE)),
            authoring_key: None,
            blueprint: Some(BlueprintRef::new("prefabs/test")),
            save_count: 0,
            load_count: 0,
            loaded_payloads: Vec::new(),
            fail_load: false,
        }
    }
}

impl DurableEntity for TestEntity {
    fn is_alive(&self) -> bool {
        self.alive
    }

    fn persistent_id(&self) -> Option<&PersistentId> {
        self.id.as_ref()
    }

    fn assign_persistent_id(&mut self, id: PersistentId) {
        self.id = Some(id);
    }

    fn flags(&self) -> PersistenceFlags {
        self.flags
    }

    fn insert_flags(&mut self, flags: PersistenceFlags) {
        self.flags.insert(flags);
    }

    fn remove_flags(&mut self, flags: PersistenceFlags) {
        self.flags.remove(flags);
    }

    fn settings(&self) -> ObjectSettings {
        self.settings.clone()
    }

    fn authoring_key(&self) -> Option<String> {
        self.authoring_key.clone()
    }

    fn save(&mut self) -> Option<StoreRecord> {
        let id = self.id.clone()?;
        self.save_count += 1;
        let mut record = StoreRecord::new(
            self.settings.record_type.clone(),
            id,
            serde_json::json!({ "saves": self.save_count }),
        );
        if let Some(blueprint) = &self.blueprint {
            record = record.with_blueprint(blueprint.clone());
        }
        Some(record)
    }

    fn load(&mut self, record: &StoreRecord, is_root: bool) -> bool {
        self.load_count += 1;
        if self.fail_load {
            return false;
        }
        self.id = Some(record.id.clone());
        self.loaded_payloads.push(record.payload.clone());
        if is_root {
            self.flags.insert(PersistenceFlags::ROOT);
        }
        true
    }
}

/// A live test entity, optionally flagged as a root.
pub fn test_entity(policy: SavePolicy, root: bool) -> Rc<RefCell<TestEntity>> {
    let mut entity = TestEntity::new(policy);
    if root {
        entity.flags.insert(PersistenceFlags::ROOT);
    }
    Rc::new(RefCell::new(entity))
}

/// View a concrete test entity as the trait-object handle the manager takes.
pub fn entity_ref(entity: &Rc<RefCell<TestEntity>>) -> EntityRef {
    entity.clone()
}

/// A ready-to-spawn entity record of [`TEST_ENTITY_TYPE`].
pub fn entity_record(id: &str, blueprint: &str) -> StoreRecord {
    StoreRecord::new(
        RecordType::new(TEST_ENTITY_TYPE),
        PersistentId::new(id),
        serde_json::json!({ "saves": 0 }),
    )
    .with_blueprint(BlueprintRef::new(blueprint))
}

// ===========================================================================
// Test scripted state
// ===========================================================================

/// Instrumented free-standing state.
#[derive(Debug)]
pub struct TestScriptedState {
    pub id: Option<PersistentId>,
    pub flags: PersistenceFlags,
    pub settings: ObjectSettings,
    pub save_count: u32,
    pub load_count: u32,
    pub fail_load: bool,
}

impl TestScriptedState {
    pub fn new(policy: SavePolicy) -> Self {
        Self {
            id: None,
            flags: PersistenceFlags::empty(),
            settings: ObjectSettings::new(policy, RecordType::new(TEST_SCRIPTED_TYPE)),
            save_count: 0,
            load_count: 0,
            fail_load: false,
        }
    }
}

impl ScriptedState for TestScriptedState {
    fn persistent_id(&self) -> Option<&PersistentId> {
        self.id.as_ref()
    }

    fn assign_persistent_id(&mut self, id: PersistentId) {
        self.id = Some(id);
    }

    fn flags(&self) -> PersistenceFlags {
        self.flags
    }

    fn settings(&self) -> ObjectSettings {
        self.settings.clone()
    }

    fn save(&mut self) -> Option<StoreRecord> {
        let id = self.id.clone()?;
        self.save_count += 1;
        Some(StoreRecord::new(
            self.settings.record_type.clone(),
            id,
            serde_json::json!({ "saves": self.save_count }),
        ))
    }

    fn load(&mut self, record: &StoreRecord) -> bool {
        self.load_count += 1;
        if self.fail_load {
            return false;
        }
        self.id = Some(record.id.clone());
        true
    }
}

pub fn test_scripted(policy: SavePolicy) -> Rc<RefCell<TestScriptedState>> {
    Rc::new(RefCell::new(TestScriptedState::new(policy)))
}

/// View a concrete test state as the trait-object handle the manager takes.
pub fn scripted_ref(state: &Rc<RefCell<TestScriptedState>>) -> ScriptedRef {
    state.clone()
}

// ===========================================================================
// Recording spawner
// ===========================================================================

/// Spawner stub: instantiates [`TestEntity`] per blueprint and records
/// every spawn and destroy.
#[derive(Debug)]
pub struct RecordingSpawner {
    /// Save policy applied to spawned entities.
    pub policy: SavePolicy,
    /// Blueprints that refuse to spawn.
    pub fail_blueprints: BTreeSet<String>,
    /// Whether spawned entities reject their `load`.
    pub fail_loads: bool,
    pub spawned: Vec<Rc<RefCell<TestEntity>>>,
    pub destroyed: Vec<EntityRef>,
}

impl RecordingSpawner {
    pub fn new() -> Self {
        Self {
            policy: SavePolicy::IntervalShutdown,
            fail_blueprints: BTreeSet::new(),
            fail_loads: false,
            spawned: Vec::new(),
            destroyed: Vec::new(),
        }
    }
}

impl Default for RecordingSpawner {
    fn default() -> Self {
        Self::new()
    }
}

impl Spawner for RecordingSpawner {
    fn spawn(&mut self, blueprint: &BlueprintRef) -> Option<EntityRef> {
        if self.fail_blueprints.contains(blueprint.as_str()) {
            return None;
        }
        let mut entity = TestEntity::new(self.policy);
        entity.blueprint = Some(blueprint.clone());
        entity.fail_load = self.fail_loads;
        let entity = Rc::new(RefCell::new(entity));
        self.spawned.push(entity.clone());
        Some(entity)
    }

    fn destroy(&mut self, entity: &EntityRef) {
        self.destroyed.push(entity.clone());
    }
}
