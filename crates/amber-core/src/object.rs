//! Durable entity-backed objects: the capability a live simulation entity
//! exposes to participate in persistence.
//!
//! The manager never knows what an entity *is* — only that it can produce
//! and consume a [`StoreRecord`](crate::store::StoreRecord), report its
//! flags, and hold a persistent id. Entities live on the simulation's main
//! thread; handles are `Rc<RefCell<_>>` per the cooperative model.

use crate::id::PersistentId;
use crate::store::{RecordType, StoreRecord};
use std::cell::RefCell;
use std::rc::Rc;

bitflags::bitflags! {
    /// Capability switches queried together throughout the manager. Kept as
    /// an explicit bit-set because combinations round-trip through record
    /// metadata.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PersistenceFlags: u8 {
        /// Independently listed in the root entity collection, as opposed to
        /// reachable only through a parent's recursive save.
        const ROOT = 1 << 0;
        /// Originates from world/session authoring content.
        const BAKED = 1 << 1;
        /// Temporarily excluded from save sweeps.
        const PAUSE_TRACKING = 1 << 2;
        /// Holds a standalone record the store must track.
        const PERSISTENT_RECORD = 1 << 3;
    }
}

/// Which sweep is responsible for persisting an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePolicy {
    /// Swept by the periodic autosave and the shutdown save.
    IntervalShutdown,
    /// Swept only by the shutdown save.
    ShutdownOnly,
    /// Never swept directly; saved only via a parent's recursive save or an
    /// explicit call.
    Manual,
}

/// Per-type persistence settings carried by every durable object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSettings {
    pub policy: SavePolicy,
    /// The declared save-data type of this object's records.
    pub record_type: RecordType,
    /// Whether roots of this type must be recreated from the store on next
    /// load even though nothing in the world references them.
    pub self_spawn: bool,
}

impl ObjectSettings {
    pub fn new(policy: SavePolicy, record_type: RecordType) -> Self {
        Self {
            policy,
            record_type,
            self_spawn: false,
        }
    }

    pub fn self_spawning(mut self) -> Self {
        self.self_spawn = true;
        self
    }
}

/// The persistence capability of an entity-backed durable object.
pub trait DurableEntity: std::fmt::Debug {
    /// Whether an owning live instance still exists. Registration is
    /// silently rejected without one.
    fn is_alive(&self) -> bool;

    fn persistent_id(&self) -> Option<&PersistentId>;

    /// Assign the id. Called once by the manager during registration;
    /// assigning an identical id again is a no-op.
    fn assign_persistent_id(&mut self, id: PersistentId);

    fn flags(&self) -> PersistenceFlags;
    fn insert_flags(&mut self, flags: PersistenceFlags);
    fn remove_flags(&mut self, flags: PersistenceFlags);

    fn settings(&self) -> ObjectSettings;

    /// Stable key derived from world-authoring data (prefab + placement),
    /// used to mint deterministic ids for baked objects. `None` for purely
    /// dynamic types.
    fn authoring_key(&self) -> Option<String> {
        None
    }

    /// Produce this object's record. `None` means the object cannot be
    /// serialized right now; the sweep moves on.
    fn save(&mut self) -> Option<StoreRecord>;

    /// Consume a record. Returns `false` on failure, in which case the
    /// caller destroys any partially created instance.
    fn load(&mut self, record: &StoreRecord, is_root: bool) -> bool;
}

/// Shared handle to a durable entity. Single-threaded by design.
pub type EntityRef = Rc<RefCell<dyn DurableEntity>>;
