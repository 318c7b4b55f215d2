//! Root entity collection reconciliation at world load: removed baked
//! roots, stale removal entries, and the bulk-load split between in-place
//! loads and fresh spawns.

use amber_core::collection::RootEntityCollection;
use amber_core::id::PersistentId;
use amber_core::manager::{PersistenceManager, SessionContext};
use amber_core::object::SavePolicy;
use amber_core::scripted::ScriptedHandle;
use amber_core::spawner::BlueprintRef;
use amber_core::settings::ManagerSettings;
use amber_core::store::RecordType;
use amber_core::test_utils::*;

fn settings() -> ManagerSettings {
    ManagerSettings {
        autosave_interval: 1.0e9,
        ..ManagerSettings::default()
    }
}

fn boot(shared: &SharedStore) -> PersistenceManager {
    let mut manager = PersistenceManager::new();
    manager.on_post_init(settings(), Some(Box::new(shared.clone())));
    manager
}

/// A baked root that was reparented in a previous session is destroyed at
/// next load, and its removal entry survives for the session after that
/// (world authoring recreates the instance every time).
#[test]
fn removed_baked_root_is_destroyed_on_load() {
    let shared = SharedStore::new();

    // Session one: the shrine is authored, then picked up into an inventory
    // (stops being a root) mid-session.
    let shrine_id;
    {
        let mut context = SessionContext::new(|| true);
        let manager = context.manager(true).expect("authorized host");
        manager.on_post_init(settings(), Some(Box::new(shared.clone())));

        let shrine = test_entity(SavePolicy::IntervalShutdown, true);
        shrine.borrow_mut().authoring_key = Some("shrine_2".into());
        shrine_id = manager.register_entity(&entity_ref(&shrine), None).unwrap();

        let mut spawner = RecordingSpawner::new();
        manager.on_world_ready(&mut spawner);

        manager.update_root_status(&entity_ref(&shrine), false);
        let collection = manager.root_collection().expect("collection exists");
        assert!(collection.removed_baked_roots.contains(&shrine_id));

        manager.on_session_end();
        context.reset();
    }

    // Session two: authoring recreates the shrine; reconciliation destroys
    // it again.
    let mut manager = boot(&shared);
    let shrine = test_entity(SavePolicy::IntervalShutdown, true);
    shrine.borrow_mut().authoring_key = Some("shrine_2".into());
    let reborn_id = manager.register_entity(&entity_ref(&shrine), None).unwrap();
    assert_eq!(reborn_id, shrine_id);

    let mut spawner = RecordingSpawner::new();
    manager.on_world_ready(&mut spawner);

    assert_eq!(spawner.destroyed.len(), 1);
    assert!(manager.find_entity(&shrine_id).is_none());

    // Still pending: the next session's authoring pass will recreate the
    // instance yet again.
    let collection = manager.root_collection().expect("collection exists");
    assert!(collection.removed_baked_roots.contains(&shrine_id));
    // Destroyed instances are never part of the bulk load.
    assert!(spawner.spawned.is_empty());
}

/// A removal entry whose instance no longer exists anywhere is stale: it is
/// dropped from the list and its id is never requested from the store.
#[test]
fn stale_removal_entry_is_dropped() {
    let shared = SharedStore::new();

    let ghost_id;
    {
        let mut context = SessionContext::new(|| true);
        let manager = context.manager(true).expect("authorized host");
        manager.on_post_init(settings(), Some(Box::new(shared.clone())));

        let ghost = test_entity(SavePolicy::IntervalShutdown, true);
        ghost.borrow_mut().authoring_key = Some("ghost_9".into());
        ghost_id = manager.register_entity(&entity_ref(&ghost), None).unwrap();

        let mut spawner = RecordingSpawner::new();
        manager.on_world_ready(&mut spawner);
        manager.update_root_status(&entity_ref(&ghost), false);

        manager.on_session_end();
        context.reset();
    }

    // Session two: the world no longer authors the ghost at all.
    let mut manager = boot(&shared);
    let mut spawner = RecordingSpawner::new();
    manager.on_world_ready(&mut spawner);

    let collection = manager.root_collection().expect("collection exists");
    assert!(!collection.removed_baked_roots.contains(&ghost_id));
    assert!(spawner.destroyed.is_empty());
    // Nothing was spawned for it either -- the id never joined a bulk find.
    assert!(spawner.spawned.is_empty());

    // The dropped entry is dropped durably: the persisted collection agrees.
    let record = shared
        .get(
            &RootEntityCollection::record_type(),
            &collection.id,
        )
        .expect("collection persisted");
    let reloaded =
        RootEntityCollection::from_record(&record).expect("readable");
    assert!(!reloaded.removed_baked_roots.contains(&ghost_id));
}

/// Records that fail to spawn never halt the rest of the bulk pass.
#[test]
fn spawn_failures_skip_to_next_record() {
    let shared = SharedStore::new();

    // Seed two dynamic self-spawn records by hand: one with a blueprint the
    // spawner refuses, one fine.
    {
        let mut context = SessionContext::new(|| true);
        let manager = context.manager(true).expect("authorized host");
        manager.on_post_init(settings(), Some(Box::new(shared.clone())));
        let mut spawner = RecordingSpawner::new();
        manager.on_world_ready(&mut spawner);

        for (name, blueprint) in [("a-doomed", "prefabs/broken"), ("b-fine", "prefabs/fine")] {
            let entity = test_entity(SavePolicy::IntervalShutdown, true);
            entity.borrow_mut().settings.self_spawn = true;
            entity.borrow_mut().blueprint =
                Some(BlueprintRef::new(blueprint));
            let _ = manager.register_entity(
                &entity_ref(&entity),
                Some(PersistentId::new(name)),
            );
        }
        manager.on_session_end();
        context.reset();
    }

    let mut manager = boot(&shared);
    let mut spawner = RecordingSpawner::new();
    spawner.fail_blueprints.insert("prefabs/broken".into());
    manager.on_world_ready(&mut spawner);

    // The broken record was skipped, the good one spawned and registered.
    assert_eq!(spawner.spawned.len(), 1);
    assert!(
        manager
            .find_entity(&PersistentId::new("b-fine"))
            .is_some()
    );
    assert!(
        manager
            .find_entity(&PersistentId::new("a-doomed"))
            .is_none()
    );
}

/// Scripted state spawns from records through the registered type factory;
/// a shutdown-only scripted state is saved by the shutdown sweep.
#[test]
fn scripted_state_round_trip() {
    let shared = SharedStore::new();

    {
        let mut context = SessionContext::new(|| true);
        let manager = context.manager(true).expect("authorized host");
        manager.on_post_init(settings(), Some(Box::new(shared.clone())));
        let mut spawner = RecordingSpawner::new();
        manager.on_world_ready(&mut spawner);

        let ledger = test_scripted(SavePolicy::ShutdownOnly);
        manager.register_scripted(
            ScriptedHandle::Direct(scripted_ref(&ledger)),
            Some(PersistentId::new("ledger-1")),
        );

        manager.on_session_end();
        assert_eq!(ledger.borrow().save_count, 1);
        context.reset();
    }

    assert!(
        shared
            .get(
                &RecordType::new(TEST_SCRIPTED_TYPE),
                &PersistentId::new("ledger-1"),
            )
            .is_some()
    );

    // Next session rebuilds the ledger from its record.
    let mut manager = boot(&shared);
    manager
        .scripted_types_mut()
        .register_type(RecordType::new(TEST_SCRIPTED_TYPE), || {
            scripted_ref(&test_scripted(SavePolicy::ShutdownOnly))
        });

    let record = shared
        .get(
            &RecordType::new(TEST_SCRIPTED_TYPE),
            &PersistentId::new("ledger-1"),
        )
        .expect("persisted");
    let state = manager.spawn_scripted_state(&record).expect("instantiable");
    assert_eq!(
        state.borrow().persistent_id(),
        Some(&PersistentId::new("ledger-1"))
    );
}
