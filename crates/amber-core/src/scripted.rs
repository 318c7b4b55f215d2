//! Free-standing persistent state: durable objects not tied to a simulation
//! entity (faction ledgers, market state, quest progress).
//!
//! Multiple lightweight proxies may alias one shared target instance. The
//! indirection is an explicit tagged variant — registration and save always
//! resolve through [`ScriptedHandle::target`], never through a proxy
//! directly.

use crate::id::PersistentId;
use crate::object::{ObjectSettings, PersistenceFlags};
use crate::store::{RecordType, StoreRecord};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// The persistence capability of a free-standing state object.
pub trait ScriptedState: std::fmt::Debug {
    fn persistent_id(&self) -> Option<&PersistentId>;
    fn assign_persistent_id(&mut self, id: PersistentId);

    fn flags(&self) -> PersistenceFlags;

    /// Settings for this type. `self_spawn` has no meaning for scripted
    /// state and is ignored.
    fn settings(&self) -> ObjectSettings;

    fn save(&mut self) -> Option<StoreRecord>;
    fn load(&mut self, record: &StoreRecord) -> bool;
}

/// Shared handle to a scripted state instance.
pub type ScriptedRef = Rc<RefCell<dyn ScriptedState>>;

/// A registerable scripted-state handle: either the instance itself or a
/// proxy forwarding to a shared target.
#[derive(Clone)]
pub enum ScriptedHandle {
    Direct(ScriptedRef),
    Proxy { target: ScriptedRef },
}

impl ScriptedHandle {
    /// The instance that actually registers and saves.
    pub fn target(&self) -> &ScriptedRef {
        match self {
            ScriptedHandle::Direct(state) => state,
            ScriptedHandle::Proxy { target } => target,
        }
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self, ScriptedHandle::Proxy { .. })
    }
}

impl std::fmt::Debug for ScriptedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptedHandle::Direct(_) => write!(f, "Direct(<state>)"),
            ScriptedHandle::Proxy { .. } => write!(f, "Proxy(<target>)"),
        }
    }
}

/// Constructor for a scripted state instance of one record type.
pub type ScriptedFactory = Box<dyn Fn() -> ScriptedRef>;

/// How a record type resolves when spawning scripted state from save data.
pub enum ScriptedTypeEntry {
    /// An instantiable type.
    Instantiable(ScriptedFactory),
    /// A proxy-only alias; instances must be created through the proxy
    /// creation path, never spawned from save data.
    ProxyAlias { target: RecordType },
}

impl std::fmt::Debug for ScriptedTypeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptedTypeEntry::Instantiable(_) => write!(f, "Instantiable(<factory>)"),
            ScriptedTypeEntry::ProxyAlias { target } => {
                f.debug_struct("ProxyAlias").field("target", target).finish()
            }
        }
    }
}

/// Maps declared record types to scripted-state constructors. Populated by
/// the host at startup, consulted when spawning from save data.
#[derive(Debug, Default)]
pub struct ScriptedTypeRegistry {
    entries: BTreeMap<RecordType, ScriptedTypeEntry>,
}

impl ScriptedTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_type(
        &mut self,
        record_type: RecordType,
        factory: impl Fn() -> ScriptedRef + 'static,
    ) {
        self.entries
            .insert(record_type, ScriptedTypeEntry::Instantiable(Box::new(factory)));
    }

    pub fn register_proxy_alias(&mut self, alias: RecordType, target: RecordType) {
        self.entries
            .insert(alias, ScriptedTypeEntry::ProxyAlias { target });
    }

    pub fn get(&self, record_type: &RecordType) -> Option<&ScriptedTypeEntry> {
        self.entries.get(record_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::SavePolicy;

    #[derive(Debug)]
    struct Ledger {
        id: Option<PersistentId>,
    }

    impl ScriptedState for Ledger {
        fn persistent_id(&self) -> Option<&PersistentId> {
            self.id.as_ref()
        }
        fn assign_persistent_id(&mut self, id: PersistentId) {
            self.id = Some(id);
        }
        fn flags(&self) -> PersistenceFlags {
            PersistenceFlags::empty()
        }
        fn settings(&self) -> ObjectSettings {
            ObjectSettings::new(SavePolicy::ShutdownOnly, RecordType::new("ledger"))
        }
        fn save(&mut self) -> Option<StoreRecord> {
            None
        }
        fn load(&mut self, _record: &StoreRecord) -> bool {
            true
        }
    }

    fn ledger() -> ScriptedRef {
        Rc::new(RefCell::new(Ledger { id: None }))
    }

    #[test]
    fn proxy_resolves_to_target() {
        let target = ledger();
        let proxy = ScriptedHandle::Proxy {
            target: target.clone(),
        };
        assert!(proxy.is_proxy());
        assert!(Rc::ptr_eq(proxy.target(), &target));
    }

    #[test]
    fn direct_handle_is_its_own_target() {
        let state = ledger();
        let handle = ScriptedHandle::Direct(state.clone());
        assert!(!handle.is_proxy());
        assert!(Rc::ptr_eq(handle.target(), &state));
    }

    #[test]
    fn many_proxies_one_target() {
        let target = ledger();
        let proxies: Vec<ScriptedHandle> = (0..3)
            .map(|_| ScriptedHandle::Proxy {
                target: target.clone(),
            })
            .collect();
        for proxy in &proxies {
            assert!(Rc::ptr_eq(proxy.target(), &target));
        }
    }

    #[test]
    fn registry_resolves_instantiable_and_alias() {
        let mut registry = ScriptedTypeRegistry::new();
        registry.register_type(RecordType::new("ledger"), ledger);
        registry.register_proxy_alias(RecordType::new("ledger_view"), RecordType::new("ledger"));

        assert!(matches!(
            registry.get(&RecordType::new("ledger")),
            Some(ScriptedTypeEntry::Instantiable(_))
        ));
        match registry.get(&RecordType::new("ledger_view")) {
            Some(ScriptedTypeEntry::ProxyAlias { target }) => {
                assert_eq!(target, &RecordType::new("ledger"));
            }
            other => panic!("expected proxy alias, got {other:?}"),
        }
        assert!(registry.get(&RecordType::new("unknown")).is_none());
    }
}
