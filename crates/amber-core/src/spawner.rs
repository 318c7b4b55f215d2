//! The host spawning interface: instantiate an entity from a blueprint,
//! destroy an instance and its children. Opaque to the persistence layer.

use crate::object::EntityRef;
use serde::{Deserialize, Serialize};

/// Opaque reference to a spawnable blueprint (prefab, archetype, template —
/// whatever the host calls it).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlueprintRef(String);

impl BlueprintRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BlueprintRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Spawning and destruction, provided by the host simulation.
pub trait Spawner {
    /// Instantiate a blueprint. `None` if the blueprint is invalid or the
    /// host refuses the spawn.
    fn spawn(&mut self, blueprint: &BlueprintRef) -> Option<EntityRef>;

    /// Destroy an instance and, recursively, its children.
    fn destroy(&mut self, entity: &EntityRef);
}
