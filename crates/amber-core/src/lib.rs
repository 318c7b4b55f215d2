//! Amber Core -- persistence orchestration for live simulations.
//!
//! This crate decides which live objects are durable, assigns them stable
//! identities, batches and time-slices their serialization to a backing
//! store, and reconciles the recorded set of top-level "root" entities
//! against the live object graph across session restarts -- all without
//! ever blocking the simulation's frame loop.
//!
//! # Lifecycle
//!
//! The [`manager::PersistenceManager`] advances through five states, driven
//! by host lifecycle events:
//!
//! 1. **PreInit** -- no store connection yet; registrations queue up.
//! 2. **PostInit** -- store and [`collection::RootEntityCollection`]
//!    available.
//! 3. **Setup** -- the one-time world reconciliation pass: destroy baked
//!    roots recorded as removed, bulk-load known roots, load live baked
//!    roots in place and spawn dynamic roots fresh.
//! 4. **Active** -- steady state; the per-frame tick drives the time-sliced
//!    autosave.
//! 5. **Shutdown** -- forced unthrottled drain plus the shutdown-only
//!    sweep, then the whole manager is torn down.
//!
//! # Cooperative time-slicing
//!
//! A save pass is an explicit resumable cursor, not a coroutine: each frame
//! tick advances it up to the configured batch size and returns control to
//! the caller. Suspension points are therefore testable without a frame
//! loop.
//!
//! # Key Types
//!
//! - [`manager::PersistenceManager`] -- state machine and facade.
//! - [`manager::SessionContext`] -- authority-gated per-session singleton.
//! - [`registry::Registry`] -- save-policy buckets and cleanup sets.
//! - [`scheduler::AutoSaveScheduler`] -- resumable save cursors.
//! - [`collection::RootEntityCollection`] -- the persisted root-set record.
//! - [`object::DurableEntity`] / [`scripted::ScriptedState`] -- the two
//!   durable object variants.
//! - [`store::StoreAdapter`] / [`spawner::Spawner`] -- host collaborators,
//!   specified at their interface only.

pub mod collection;
pub mod id;
pub mod manager;
pub mod object;
pub mod registry;
pub mod scheduler;
pub mod scripted;
pub mod settings;
pub mod spawner;
pub mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
