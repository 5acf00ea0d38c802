//! Lifecycle Entities and Transition Records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::guards::GuardContext;
use super::state::InvestorState;

/// An investor (or case) whose status is governed by the lifecycle.
///
/// The state is readable everywhere but only the state machine can change it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEntity {
    entity_id: Uuid,
    state: InvestorState,
    /// Sequence number of the record that produced `state`
    version: u64,
}

impl LifecycleEntity {
    pub(crate) fn new(entity_id: Uuid, state: InvestorState) -> Self {
        Self {
            entity_id,
            state,
            version: 0,
        }
    }

    /// Rebuild an entity from its transition history.
    ///
    /// The current state is the `to_state` of the most recent record; an
    /// entity with no history has not been initialized and yields `None`.
    pub fn from_history(entity_id: Uuid, history: &[LifecycleTransitionRecord]) -> Option<Self> {
        history
            .iter()
            .filter(|r| r.entity_id == entity_id)
            .max_by_key(|r| (r.sequence, r.transitioned_at))
            .map(|r| Self {
                entity_id,
                state: r.to_state,
                version: r.sequence,
            })
    }

    pub fn entity_id(&self) -> Uuid {
        self.entity_id
    }

    pub fn state(&self) -> InvestorState {
        self.state
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Apply a validated transition; returns the new version
    pub(crate) fn advance(&mut self, state: InvestorState) -> u64 {
        self.state = state;
        self.version += 1;
        self.version
    }
}

/// Immutable audit record produced by every successful transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleTransitionRecord {
    pub record_id: Uuid,
    pub entity_id: Uuid,
    /// `None` for the initial transition into the lifecycle
    pub from_state: Option<InvestorState>,
    pub to_state: InvestorState,
    /// DSL verb whose execution triggered the transition
    pub trigger_verb: String,
    pub actor: String,
    pub transitioned_at: DateTime<Utc>,
    /// Position in the entity's history (0 for the initial record)
    pub sequence: u64,
    /// Context the guards were evaluated against
    pub context: GuardContext,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(
        entity_id: Uuid,
        to: InvestorState,
        offset_secs: i64,
        seq: u64,
    ) -> LifecycleTransitionRecord {
        LifecycleTransitionRecord {
            record_id: Uuid::new_v4(),
            entity_id,
            from_state: None,
            to_state: to,
            trigger_verb: "investor.update-status".into(),
            actor: "ops".into(),
            transitioned_at: Utc::now() + Duration::seconds(offset_secs),
            sequence: seq,
            context: GuardContext::new(),
        }
    }

    #[test]
    fn test_from_history_uses_latest_record() {
        let id = Uuid::new_v4();
        let history = vec![
            record(id, InvestorState::Prechecks, 10, 1),
            record(id, InvestorState::Opportunity, 0, 0),
            record(id, InvestorState::KycPending, 20, 2),
        ];
        let entity = LifecycleEntity::from_history(id, &history).unwrap();
        assert_eq!(entity.state(), InvestorState::KycPending);
        assert_eq!(entity.version(), 2);
    }

    #[test]
    fn test_from_history_ignores_other_entities() {
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let history = vec![
            record(id, InvestorState::Opportunity, 0, 0),
            record(other, InvestorState::Active, 50, 7),
        ];
        let entity = LifecycleEntity::from_history(id, &history).unwrap();
        assert_eq!(entity.state(), InvestorState::Opportunity);
        assert!(LifecycleEntity::from_history(Uuid::new_v4(), &history).is_none());
    }
}
