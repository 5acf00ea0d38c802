//! Transition Persistence and Per-Entity Serialization
//!
//! `TransitionStore` is the seam to the external audit/persistence component.
//! `LifecycleService` wraps the state machine with a per-entity async lock so
//! concurrent callers transitioning the same entity are serialized, while
//! different entities proceed independently. A lock slot is dropped once no
//! caller holds or awaits it. The store additionally enforces
//! an optimistic sequence check, mirroring a database row-version guard.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::guards::GuardContext;
use super::machine::LifecycleStateMachine;
use super::record::{LifecycleEntity, LifecycleTransitionRecord};
use super::state::InvestorState;
use super::LifecycleError;

/// Errors raised by a transition store backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("sequence conflict for entity {entity_id}: expected {expected}, got {found}")]
    SequenceConflict {
        entity_id: Uuid,
        expected: u64,
        found: u64,
    },

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Append-only persistence of lifecycle transition records
#[async_trait]
pub trait TransitionStore: Send + Sync {
    /// Append a record. Implementations reject a record whose `sequence` is
    /// not exactly the current history length.
    async fn append(&self, record: LifecycleTransitionRecord) -> Result<(), StoreError>;

    /// Full history of an entity, oldest first
    async fn history(&self, entity_id: Uuid) -> Result<Vec<LifecycleTransitionRecord>, StoreError>;
}

/// Process-local store, used by tests and single-node deployments
#[derive(Debug, Default)]
pub struct InMemoryTransitionStore {
    records: RwLock<HashMap<Uuid, Vec<LifecycleTransitionRecord>>>,
}

impl InMemoryTransitionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransitionStore for InMemoryTransitionStore {
    async fn append(&self, record: LifecycleTransitionRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let history = records.entry(record.entity_id).or_default();
        let expected = history.len() as u64;
        if record.sequence != expected {
            return Err(StoreError::SequenceConflict {
                entity_id: record.entity_id,
                expected,
                found: record.sequence,
            });
        }
        history.push(record);
        Ok(())
    }

    async fn history(&self, entity_id: Uuid) -> Result<Vec<LifecycleTransitionRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .get(&entity_id)
            .cloned()
            .unwrap_or_default())
    }
}

type LockMap = Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>;

/// A caller's claim on one entity's lock slot. The slot is removed from the
/// map when the last claimant drops.
struct EntityLease<'a> {
    locks: &'a LockMap,
    entity_id: Uuid,
    lock: Arc<AsyncMutex<()>>,
}

impl Drop for EntityLease<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Released under the map lock so a concurrent claim cannot interleave
        let lock = std::mem::take(&mut self.lock);
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&self.entity_id);
        }
        drop(lock);
    }
}

/// State machine + store with per-entity mutual exclusion
pub struct LifecycleService<S: TransitionStore> {
    machine: LifecycleStateMachine,
    store: Arc<S>,
    locks: LockMap,
}

impl<S: TransitionStore> LifecycleService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            machine: LifecycleStateMachine::new(),
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn machine(&self) -> &LifecycleStateMachine {
        &self.machine
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn lease(&self, entity_id: Uuid) -> EntityLease<'_> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = locks.entry(entity_id).or_default().clone();
        EntityLease {
            locks: &self.locks,
            entity_id,
            lock,
        }
    }

    /// Entities whose lock slot is currently held or awaited
    pub fn active_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Current state of an entity, rehydrated from its history
    pub async fn current_state(
        &self,
        entity_id: Uuid,
    ) -> Result<Option<InvestorState>, LifecycleError> {
        let history = self.store.history(entity_id).await?;
        Ok(LifecycleEntity::from_history(entity_id, &history).map(|e| e.state()))
    }

    /// Enter a new entity into the lifecycle
    pub async fn start(
        &self,
        entity_id: Uuid,
        trigger_verb: &str,
        actor: &str,
    ) -> Result<LifecycleTransitionRecord, LifecycleError> {
        let lease = self.lease(entity_id);
        let _guard = lease.lock.lock().await;

        if !self.store.history(entity_id).await?.is_empty() {
            return Err(LifecycleError::AlreadyInitialized(entity_id));
        }

        let (_, record) = self.machine.initialize(entity_id, trigger_verb, actor);
        self.store.append(record.clone()).await?;
        Ok(record)
    }

    /// Serialized load → validate → mutate → append for one entity
    pub async fn transition(
        &self,
        entity_id: Uuid,
        to: InvestorState,
        trigger_verb: &str,
        context: &GuardContext,
        actor: &str,
    ) -> Result<LifecycleTransitionRecord, LifecycleError> {
        let lease = self.lease(entity_id);
        let _guard = lease.lock.lock().await;

        let history = self.store.history(entity_id).await?;
        let mut entity = LifecycleEntity::from_history(entity_id, &history)
            .ok_or(LifecycleError::EntityNotFound(entity_id))?;

        debug!(%entity_id, from = %entity.state(), %to, "transition requested");

        let record = self
            .machine
            .transition_state(&mut entity, to, trigger_verb, context, actor)?;
        self.store.append(record.clone()).await?;
        Ok(record)
    }
}
