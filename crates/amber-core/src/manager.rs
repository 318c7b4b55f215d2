//! The persistence manager: lifecycle state machine and facade composing
//! identity minting, the bucket registry, the auto-save scheduler, and root
//! entity reconciliation.
//!
//! # Lifecycle
//!
//! `PreInit → PostInit → Setup → Active → Shutdown`, driven by host events:
//!
//! 1. **Post-init** — the store connection and root entity collection become
//!    available. Registrations queued earlier are now flushable.
//! 2. **Per-frame tick** — accumulates toward the autosave interval and
//!    advances the time-sliced save pass.
//! 3. **World-ready** — the one-time reconciliation pass: destroy baked
//!    roots recorded as removed, bulk-load every known root record, load
//!    live baked roots in place and spawn dynamic roots fresh.
//! 4. **Session-end** — forced unthrottled drain, shutdown save, then the
//!    host resets the whole [`SessionContext`].
//!
//! There is one logical writer per session: the registry and the collection
//! are owned here exclusively, and the wholesale teardown on session reset
//! is the only locking discipline required.

use crate::collection::RootEntityCollection;
use crate::id::{IdGenerator, PersistentId};
use crate::object::{DurableEntity, EntityRef, ObjectSettings, PersistenceFlags};
use crate::registry::Registry;
use crate::scheduler::AutoSaveScheduler;
use crate::scripted::{ScriptedHandle, ScriptedRef, ScriptedTypeEntry, ScriptedTypeRegistry};
use crate::settings::ManagerSettings;
use crate::spawner::Spawner;
use crate::store::{RecordType, StoreAdapter, StoreRecord};
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// Lifecycle state
// ---------------------------------------------------------------------------

/// Manager lifecycle states, in order. No cycles; the only way back is the
/// full session reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ManagerState {
    /// Before the store connection exists.
    PreInit,
    /// Store and root entity collection are available; the world's objects
    /// have not announced themselves yet.
    PostInit,
    /// Initial registrations flushed; the one-time reconciliation pass runs.
    Setup,
    /// Steady-state serving.
    Active,
    /// Entered exactly once; pending saves drain synchronously, then the
    /// manager is torn down.
    Shutdown,
}

/// Subscriber notified on every state transition, so dependent subsystems
/// can gate themselves (e.g. "register nothing before post-init").
pub type StateListener = Box<dyn FnMut(ManagerState)>;

// ---------------------------------------------------------------------------
// Session context
// ---------------------------------------------------------------------------

/// Host-owned wrapper for the per-session manager singleton.
///
/// Only the authoritative save host may run persistence; the authority
/// predicate is external and checked on every access. The manager is built
/// lazily on the first authorized `manager(true)` call and torn down
/// explicitly on session end — no stale state survives into the next
/// session, the store is the only thing that does.
pub struct SessionContext {
    authority: Box<dyn Fn() -> bool>,
    manager: Option<PersistenceManager>,
}

impl SessionContext {
    pub fn new(authority: impl Fn() -> bool + 'static) -> Self {
        Self {
            authority: Box::new(authority),
            manager: None,
        }
    }

    /// The singleton, or `None` when this process is not the save host or
    /// the manager does not exist and `create` was disabled.
    pub fn manager(&mut self, create: bool) -> Option<&mut PersistenceManager> {
        if !(self.authority)() {
            return None;
        }
        if self.manager.is_none() && create {
            self.manager = Some(PersistenceManager::new());
        }
        self.manager.as_mut()
    }

    pub fn is_active(&self) -> bool {
        self.manager.is_some()
    }

    /// Drop the manager and everything it owns. Called when a new session
    /// loads.
    pub fn reset(&mut self) {
        self.manager = None;
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("active", &self.manager.is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Persistence manager
// ---------------------------------------------------------------------------

pub struct PersistenceManager {
    state: ManagerState,
    settings: ManagerSettings,

    store: Option<Box<dyn StoreAdapter>>,
    root_collection: Option<RootEntityCollection>,

    registry: Registry,
    scheduler: AutoSaveScheduler,
    scripted_types: ScriptedTypeRegistry,
    id_gen: IdGenerator,

    pending_entities: Vec<EntityRef>,
    pending_scripted: Vec<ScriptedHandle>,

    /// Baked roots seen before world init. Discarded after the
    /// reconciliation pass; it is only needed during setup.
    baked_roots: Option<BTreeMap<PersistentId, EntityRef>>,

    state_listeners: Vec<StateListener>,
}

impl PersistenceManager {
    pub fn new() -> Self {
        let settings = ManagerSettings::default();
        let id_gen = IdGenerator::new(settings.hive_id);
        Self {
            state: ManagerState::PreInit,
            settings,
            store: None,
            root_collection: None,
            registry: Registry::new(),
            scheduler: AutoSaveScheduler::new(),
            scripted_types: ScriptedTypeRegistry::new(),
            id_gen,
            pending_entities: Vec::new(),
            pending_scripted: Vec::new(),
            baked_roots: Some(BTreeMap::new()),
            state_listeners: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // State machine
    // -----------------------------------------------------------------------

    pub fn state(&self) -> ManagerState {
        self.state
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Subscribe to state transitions.
    pub fn on_state_change(&mut self, listener: impl FnMut(ManagerState) + 'static) {
        self.state_listeners.push(Box::new(listener));
    }

    fn set_state(&mut self, state: ManagerState) {
        self.state = state;
        for listener in &mut self.state_listeners {
            listener(state);
        }
    }

    /// The store connection. `None` until post-init, permanently set after.
    pub fn store(&self) -> Option<&dyn StoreAdapter> {
        self.store.as_deref()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn scheduler(&self) -> &AutoSaveScheduler {
        &self.scheduler
    }

    pub fn root_collection(&self) -> Option<&RootEntityCollection> {
        self.root_collection.as_ref()
    }

    /// The scripted-state type registry, for host startup registration.
    pub fn scripted_types_mut(&mut self) -> &mut ScriptedTypeRegistry {
        &mut self.scripted_types
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Assign the entity its persistent id (minting one under the baked
    /// rule before `Setup` if none is given) and classify it into the
    /// correct bucket. Returns `None` when the object has no owning live
    /// instance.
    ///
    /// Registering the same object again never changes its id.
    pub fn register_entity(
        &mut self,
        entity: &EntityRef,
        explicit_id: Option<PersistentId>,
    ) -> Option<PersistentId> {
        let (id, settings, flags, is_root) = {
            let mut object = entity.borrow_mut();
            if !object.is_alive() {
                return None;
            }

            let id = match explicit_id.or_else(|| object.persistent_id().cloned()) {
                Some(id) => id,
                None => self.mint_entity_id(&*object),
            };

            // Baked status is recoverable from the id prefix alone; restore
            // it so reloaded roots diff correctly against the collection.
            if id.is_baked() {
                object.insert_flags(PersistenceFlags::BAKED);
            }
            object.assign_persistent_id(id.clone());

            let flags = object.flags();
            (
                id,
                object.settings(),
                flags,
                flags.contains(PersistenceFlags::ROOT),
            )
        };

        self.registry
            .update_entity_status(entity, &id, &settings, flags, is_root);
        self.update_root_collection(entity, &id, &settings, flags, is_root);
        Some(id)
    }

    fn mint_entity_id(&self, entity: &dyn DurableEntity) -> PersistentId {
        if self.state < ManagerState::Setup {
            if let Some(key) = entity.authoring_key() {
                return self.id_gen.generate_baked(&key);
            }
        }
        self.id_gen.generate()
    }

    /// Bucket a scripted-state handle, resolving proxies to their target.
    /// Returns the target's id.
    pub fn register_scripted(
        &mut self,
        handle: ScriptedHandle,
        explicit_id: Option<PersistentId>,
    ) -> PersistentId {
        let target = handle.target().clone();
        let (id, policy) = {
            let mut state = target.borrow_mut();
            let id = match explicit_id.or_else(|| state.persistent_id().cloned()) {
                Some(id) => id,
                None => self.id_gen.generate(),
            };
            state.assign_persistent_id(id.clone());
            (id, state.settings().policy)
        };

        self.registry.register_scripted(&id, handle, policy);
        id
    }

    /// Register a proxy aliasing a shared target instance. The proxy saves
    /// and searches through the target; the target's id is reused.
    pub fn create_proxy(&mut self, target: &ScriptedRef) -> ScriptedHandle {
        let handle = ScriptedHandle::Proxy {
            target: target.clone(),
        };
        self.register_scripted(handle.clone(), None);
        handle
    }

    /// Defer registration; flushed before any lookup or save pass.
    pub fn enqueue_entity_registration(&mut self, entity: EntityRef) {
        self.pending_entities.push(entity);
    }

    pub fn enqueue_scripted_registration(&mut self, handle: ScriptedHandle) {
        self.pending_scripted.push(handle);
    }

    /// Register everything still pending so lookups see a consistent view.
    /// Entity registrations wait for the store (post-init); scripted state
    /// does not need it and always flushes.
    pub fn flush_registrations(&mut self) {
        if self.state >= ManagerState::PostInit {
            let pending = std::mem::take(&mut self.pending_entities);
            for entity in &pending {
                let _ = self.register_entity(entity, None);
            }
        }

        let pending = std::mem::take(&mut self.pending_scripted);
        for handle in pending {
            self.register_scripted(handle, None);
        }
    }

    /// Remove the entity from all buckets. No-op if unregistered. Does not
    /// delete the store record — that is a deliberate [`remove_record`]
    /// decision.
    ///
    /// [`remove_record`]: PersistenceManager::remove_record
    pub fn unregister_entity(&mut self, entity: &EntityRef) {
        let id = entity.borrow().persistent_id().cloned();
        if let Some(id) = id {
            self.registry.unregister_entity(&id);
            if let Some(baked_roots) = self.baked_roots.as_mut() {
                baked_roots.remove(&id);
            }
        }
    }

    pub fn unregister_scripted(&mut self, handle: &ScriptedHandle) {
        let id = handle.target().borrow().persistent_id().cloned();
        if let Some(id) = id {
            self.registry.unregister_scripted(&id);
        }
    }

    // -----------------------------------------------------------------------
    // Root status
    // -----------------------------------------------------------------------

    /// An entity became (or stopped being) a top-level root — e.g. an item
    /// was picked up into an inventory. Re-buckets it and keeps the root
    /// entity collection truthful.
    pub fn update_root_status(&mut self, entity: &EntityRef, is_root: bool) {
        let (id, settings, flags) = {
            let mut object = entity.borrow_mut();
            if is_root {
                object.insert_flags(PersistenceFlags::ROOT);
            } else {
                object.remove_flags(PersistenceFlags::ROOT);
            }
            let Some(id) = object.persistent_id().cloned() else {
                return;
            };
            (id, object.settings(), object.flags())
        };

        self.registry
            .update_entity_status(entity, &id, &settings, flags, is_root);
        self.update_root_collection(entity, &id, &settings, flags, is_root);
    }

    /// Record an entity for recreation on next load regardless of its
    /// type's default settings.
    pub fn force_self_spawn(&mut self, entity: &EntityRef) {
        let (id, settings) = {
            let object = entity.borrow();
            let Some(id) = object.persistent_id().cloned() else {
                return;
            };
            (id, object.settings())
        };
        if let Some(collection) = self.root_collection.as_mut() {
            collection.force_self_spawn(&settings.record_type, &id);
        }
    }

    fn update_root_collection(
        &mut self,
        entity: &EntityRef,
        id: &PersistentId,
        settings: &ObjectSettings,
        flags: PersistenceFlags,
        is_root: bool,
    ) {
        if self.state < ManagerState::Active {
            // Before the world load finishes, baked roots are tracked in a
            // working set; the collection is reconciled from it in one pass.
            if let Some(baked_roots) = self.baked_roots.as_mut() {
                if flags.contains(PersistenceFlags::BAKED) {
                    if is_root {
                        baked_roots.insert(id.clone(), entity.clone());
                    } else {
                        baked_roots.remove(id);
                    }
                }
            }
            return;
        }

        let Some(collection) = self.root_collection.as_mut() else {
            return;
        };
        if is_root {
            collection.add(flags, settings, id);
        } else {
            collection.remove(flags, settings, id);
        }
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// Find a registered entity by id. Flushes pending registrations first;
    /// probes autosave, then shutdown, then uncategorized.
    pub fn find_entity(&mut self, id: &PersistentId) -> Option<EntityRef> {
        self.flush_registrations();
        self.registry.entities.find(id).cloned()
    }

    /// Find a registered scripted state by id, same flush and precedence.
    pub fn find_scripted(&mut self, id: &PersistentId) -> Option<ScriptedHandle> {
        self.flush_registrations();
        self.registry.scripted.find(id).cloned()
    }

    // -----------------------------------------------------------------------
    // Spawning from save data
    // -----------------------------------------------------------------------

    /// Spawn and register an entity from its record. On any failure the
    /// partial instance and its children are destroyed and `None` is
    /// returned; the surrounding bulk pass continues.
    pub fn spawn_entity(
        &mut self,
        record: &StoreRecord,
        is_root: bool,
        spawner: &mut dyn Spawner,
    ) -> Option<EntityRef> {
        let Some(blueprint) = record.blueprint.as_ref() else {
            log::error!(
                "record '{}:{}' carries no blueprint reference, cannot spawn; ignored",
                record.record_type,
                record.id
            );
            return None;
        };

        let Some(entity) = spawner.spawn(blueprint) else {
            log::error!(
                "failed to spawn '{}:{}' from blueprint '{blueprint}'; ignored",
                record.record_type,
                record.id
            );
            return None;
        };

        if !entity.borrow_mut().load(record, is_root) {
            log::error!(
                "load failed for '{}:{}'; destroying partial instance",
                record.record_type,
                record.id
            );
            spawner.destroy(&entity);
            return None;
        }

        let _ = self.register_entity(&entity, Some(record.id.clone()));
        Some(entity)
    }

    /// Construct and register a scripted state from its record. Refuses
    /// proxy-only aliases: proxies are created through [`create_proxy`],
    /// not from save data.
    ///
    /// [`create_proxy`]: PersistenceManager::create_proxy
    pub fn spawn_scripted_state(&mut self, record: &StoreRecord) -> Option<ScriptedRef> {
        let state = match self.scripted_types.get(&record.record_type) {
            Some(ScriptedTypeEntry::Instantiable(factory)) => factory(),
            Some(ScriptedTypeEntry::ProxyAlias { target }) => {
                log::error!(
                    "cannot spawn '{}': it is only a proxy for '{target}' instances; \
                     use the proxy creation path instead",
                    record.record_type
                );
                return None;
            }
            None => {
                log::error!(
                    "no scripted state type registered for '{}'; ignored",
                    record.record_type
                );
                return None;
            }
        };

        if !state.borrow_mut().load(record) {
            log::error!(
                "load failed for scripted state '{}:{}'; ignored",
                record.record_type,
                record.id
            );
            return None;
        }

        self.register_scripted(ScriptedHandle::Direct(state.clone()), Some(record.id.clone()));
        Some(state)
    }

    // -----------------------------------------------------------------------
    // Record plumbing
    // -----------------------------------------------------------------------

    /// Fire-and-forget create-or-update. Failures are logged, never awaited.
    pub fn write_record(&mut self, record: StoreRecord) {
        let Some(store) = self.store.as_deref_mut() else {
            return;
        };
        if let Err(err) = store.create_or_update(record) {
            log::warn!("record write failed: {err}");
        }
    }

    /// Deliberately delete a record, clearing any pending cleanup for the
    /// id first so the sweep does not remove it twice.
    pub fn remove_record(&mut self, record_type: &RecordType, id: &PersistentId) {
        self.registry.autosave_cleanup.remove(id);
        self.registry.shutdown_cleanup.remove(id);
        let Some(store) = self.store.as_deref_mut() else {
            return;
        };
        if let Err(err) = store.remove(record_type, id) {
            log::warn!("record remove for '{record_type}:{id}' failed: {err}");
        }
    }

    // -----------------------------------------------------------------------
    // Auto-save
    // -----------------------------------------------------------------------

    /// Begin an auto-save pass. A no-op while one is already running; the
    /// pass itself advances via [`auto_save_tick`].
    ///
    /// [`auto_save_tick`]: PersistenceManager::auto_save_tick
    pub fn auto_save(&mut self) {
        if self.scheduler.is_active() {
            return;
        }
        if self.store.is_none() {
            return;
        }

        self.flush_registrations();

        // Capture cursors only after the flush; membership may have changed
        // since the previous pass.
        let entity_ids = self.registry.entities.autosave.keys().cloned().collect();
        let scripted_ids = self.registry.scripted.autosave.keys().cloned().collect();
        self.scheduler.begin(entity_ids, scripted_ids);

        log::debug!("persistence auto-save started");
    }

    /// Advance the current auto-save pass by one frame slice.
    ///
    /// While `Active`, execution suspends at the configured batch boundary
    /// and resumes at the same cursor position next tick. During the
    /// shutdown drain the throttle is bypassed and the whole pass completes
    /// in one call.
    pub fn auto_save_tick(&mut self) {
        if !self.scheduler.is_active() {
            return;
        }
        let batch = self.settings.autosave_batch_size.max(1);
        let throttled = self.state == ManagerState::Active;

        let Some(store) = self.store.as_deref_mut() else {
            self.scheduler.finish();
            return;
        };

        loop {
            let Some(id) = self.scheduler.entity_cursor.advance() else {
                break;
            };
            // Ids that left the bucket mid-pass are skipped at their slot.
            let Some(entity) = self.registry.entities.autosave.get(&id) else {
                continue;
            };

            let mut object = entity.borrow_mut();
            if object.flags().contains(PersistenceFlags::PAUSE_TRACKING) {
                continue;
            }
            if let Some(record) = object.save() {
                object.insert_flags(PersistenceFlags::PERSISTENT_RECORD);
                if let Err(err) = store.create_or_update(record) {
                    log::warn!("autosave write for '{id}' failed: {err}");
                }
            }
            drop(object);

            self.scheduler.operations += 1;
            if throttled && (self.scheduler.operations + 1) % batch == 0 {
                return; // Suspend until next tick.
            }
        }

        loop {
            let Some(id) = self.scheduler.scripted_cursor.advance() else {
                break;
            };
            let Some(handle) = self.registry.scripted.autosave.get(&id) else {
                continue;
            };

            let mut state = handle.target().borrow_mut();
            if state.flags().contains(PersistenceFlags::PAUSE_TRACKING) {
                continue;
            }
            if let Some(record) = state.save() {
                if let Err(err) = store.create_or_update(record) {
                    log::warn!("autosave write for '{id}' failed: {err}");
                }
            }
            drop(state);

            self.scheduler.operations += 1;
            if throttled && (self.scheduler.operations + 1) % batch == 0 {
                return;
            }
        }

        if let Some(collection) = self.root_collection.as_ref() {
            collection.save(&mut *store);
        }

        // Purge records of former roots that no parent's recursive save
        // claimed.
        let autosave_cleanup = std::mem::take(&mut self.registry.autosave_cleanup);
        let shutdown_cleanup = std::mem::take(&mut self.registry.shutdown_cleanup);
        for (id, record_type) in autosave_cleanup.into_iter().chain(shutdown_cleanup) {
            if let Err(err) = store.remove(&record_type, &id) {
                log::warn!("cleanup remove for '{record_type}:{id}' failed: {err}");
            }
        }

        self.scheduler.finish();
        log::debug!("persistence auto-save complete");
    }

    /// The unthrottled sweep over the shutdown-only buckets, plus the same
    /// collection save and cleanup drain as a completed auto-save pass.
    /// Invoked once during the shutdown transition.
    pub fn shut_down_save(&mut self) {
        log::debug!("persistence shutdown-save started");

        self.flush_registrations();

        let Some(store) = self.store.as_deref_mut() else {
            return;
        };

        for entity in self.registry.entities.shutdown.values() {
            let mut object = entity.borrow_mut();
            if object.flags().contains(PersistenceFlags::PAUSE_TRACKING) {
                continue;
            }
            if let Some(record) = object.save() {
                object.insert_flags(PersistenceFlags::PERSISTENT_RECORD);
                if let Err(err) = store.create_or_update(record) {
                    log::warn!("shutdown write failed: {err}");
                }
            }
        }

        for handle in self.registry.scripted.shutdown.values() {
            let mut state = handle.target().borrow_mut();
            if state.flags().contains(PersistenceFlags::PAUSE_TRACKING) {
                continue;
            }
            if let Some(record) = state.save() {
                if let Err(err) = store.create_or_update(record) {
                    log::warn!("shutdown write failed: {err}");
                }
            }
        }

        if let Some(collection) = self.root_collection.as_ref() {
            collection.save(&mut *store);
        }

        let autosave_cleanup = std::mem::take(&mut self.registry.autosave_cleanup);
        let shutdown_cleanup = std::mem::take(&mut self.registry.shutdown_cleanup);
        for (id, record_type) in autosave_cleanup.into_iter().chain(shutdown_cleanup) {
            if let Err(err) = store.remove(&record_type, &id) {
                log::warn!("cleanup remove for '{record_type}:{id}' failed: {err}");
            }
        }

        log::debug!("persistence shutdown-save complete");
    }

    // -----------------------------------------------------------------------
    // Host lifecycle events
    // -----------------------------------------------------------------------

    /// The store connection is (or is not) available. Without one the
    /// manager stays inert: a configuration failure is fatal to persistence
    /// only, never to the host.
    pub fn on_post_init(
        &mut self,
        settings: ManagerSettings,
        store: Option<Box<dyn StoreAdapter>>,
    ) {
        self.settings = settings;
        self.id_gen = IdGenerator::new(self.settings.hive_id);

        let Some(store) = store else {
            log::error!("no store connection available; persistence stays disabled");
            return;
        };

        let collection_id = self.id_gen.root_collection_id();
        let collection = RootEntityCollection::load_or_create(&*store, collection_id);

        self.store = Some(store);
        self.root_collection = Some(collection);
        self.set_state(ManagerState::PostInit);
    }

    /// Per-frame tick: accumulate toward the autosave interval and advance
    /// any running pass.
    pub fn on_frame(&mut self, dt: f32) {
        if !self.settings.enable_autosave {
            return;
        }

        self.scheduler.accumulator += dt;
        if self.scheduler.accumulator >= self.settings.autosave_interval {
            self.auto_save();
        }
        self.auto_save_tick();
    }

    /// The one-time reconciliation pass over the freshly loaded world.
    pub fn on_world_ready(&mut self, spawner: &mut dyn Spawner) {
        log::debug!("persistence initial world load started");

        self.flush_registrations();
        self.set_state(ManagerState::Setup);

        // Destroy baked entities that shall no longer be world roots. Ids
        // with no live instance are stale: nothing to remove, already gone.
        let removal_ids: Vec<PersistentId> = self
            .root_collection
            .as_ref()
            .map(|c| c.removed_baked_roots.iter().cloned().collect())
            .unwrap_or_default();
        let mut stale_ids = Vec::new();
        for id in removal_ids {
            let Some(entity) = self.find_entity(&id) else {
                stale_ids.push(id);
                continue;
            };

            if let Some(collection) = self.root_collection.as_mut() {
                // Listed here before destruction; the instance drops out of
                // the baked working set below and the id could not be
                // recovered afterwards.
                collection.possible_baked_roots.insert(id.clone());
            }

            log::debug!("deleting removed baked root '{id}'");
            spawner.destroy(&entity);
            self.unregister_entity(&entity);
        }
        if let Some(collection) = self.root_collection.as_mut() {
            for id in &stale_ids {
                collection.removed_baked_roots.remove(id);
            }
        }

        // One bulk request per record type: recorded self-spawners merged
        // with every baked root candidate currently in the world.
        let mut bulk: BTreeMap<RecordType, BTreeSet<PersistentId>> = self
            .root_collection
            .as_ref()
            .map(|c| c.self_spawn_dynamic.clone())
            .unwrap_or_default();
        if let (Some(baked_roots), Some(collection)) =
            (self.baked_roots.as_ref(), self.root_collection.as_mut())
        {
            for (id, entity) in baked_roots {
                // Remember which ids were world roots at load finish so only
                // those are diffed into the removal list on parent change.
                collection.possible_baked_roots.insert(id.clone());
                let record_type = entity.borrow().settings().record_type;
                bulk.entry(record_type).or_default().insert(id.clone());
            }
        }

        let mut records = Vec::new();
        if let Some(store) = self.store.as_deref() {
            for (record_type, ids) in &bulk {
                for record in store.find_all(record_type, &|record| ids.contains(&record.id)) {
                    if record.record_type != *record_type {
                        log::error!(
                            "unexpected record type '{}' in bulk load for '{record_type}'; ignored",
                            record.record_type
                        );
                        continue;
                    }
                    records.push(record);
                }
            }
        }

        for record in records {
            // Load data in place for live baked roots; spawn everything
            // else fresh as a dynamic root.
            let baked = self
                .baked_roots
                .as_ref()
                .and_then(|b| b.get(&record.id))
                .cloned();
            if let Some(entity) = baked {
                if !entity.borrow_mut().load(&record, true) {
                    log::error!(
                        "baked root '{}' rejected its record; left as authored",
                        record.id
                    );
                }
                continue;
            }
            self.spawn_entity(&record, true, spawner);
        }

        // Persist any mapping or root changes detected during world init.
        if let (Some(collection), Some(store)) =
            (self.root_collection.as_ref(), self.store.as_deref_mut())
        {
            collection.save(store);
        }

        // Only needed during this pass.
        self.baked_roots = None;

        self.set_state(ManagerState::Active);
        log::debug!("persistence initial world load complete");
    }

    /// Forced drain and shutdown save. The host resets the session context
    /// afterwards.
    pub fn on_session_end(&mut self) {
        log::debug!("persistence shutting down");
        self.set_state(ManagerState::Shutdown);

        self.auto_save();
        // Shutdown state bypasses the batch throttle: one call drains the
        // whole pass.
        self.auto_save_tick();
        self.shut_down_save();

        log::debug!("persistence shut down");
    }
}

impl Default for PersistenceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PersistenceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceManager")
            .field("state", &self.state)
            .field("settings", &self.settings)
            .field("registry", &self.registry)
            .field("scheduler", &self.scheduler)
            .field("root_collection", &self.root_collection)
            .finish_non_exhaustive()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
