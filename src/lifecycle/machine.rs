//! Lifecycle State Machine
//!
//! Table-driven transition checks, guard evaluation and the single mutation
//! point for an entity's state. Every failure is terminal for the call: the
//! machine never retries, and the same entity state and context always give
//! the same answer.
//!
//! Callers must serialize transitions of the *same* entity (see
//! [`super::store::LifecycleService`]); different entities are independent.

use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};
use uuid::Uuid;

use super::guards::{GuardCondition, GuardContext};
use super::record::{LifecycleEntity, LifecycleTransitionRecord};
use super::state::InvestorState;
use super::transitions::{index, TransitionIndex};
use super::LifecycleError;

/// Handle over the static investor transition table
#[derive(Clone, Copy)]
pub struct LifecycleStateMachine {
    table: &'static TransitionIndex,
}

impl Default for LifecycleStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LifecycleStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleStateMachine")
            .field("edges", &self.table.guards.len())
            .finish()
    }
}

impl LifecycleStateMachine {
    pub fn new() -> Self {
        Self { table: index() }
    }

    // ------------------------------------------------------------------
    // Structural queries
    // ------------------------------------------------------------------

    /// True iff `to` is an allowed target of `from` (never for `from == to`)
    pub fn can_transition(&self, from: InvestorState, to: InvestorState) -> bool {
        from != to
            && self
                .table
                .adjacency
                .get(&from)
                .is_some_and(|targets| targets.contains(&to))
    }

    /// Guards attached to the edge; empty for unguarded or invalid edges
    pub fn guard_conditions(
        &self,
        from: InvestorState,
        to: InvestorState,
    ) -> &'static [GuardCondition] {
        self.table.guards.get(&(from, to)).copied().unwrap_or(&[])
    }

    /// Forward adjacency of `from`, in table order
    pub fn valid_transitions(&self, from: InvestorState) -> Vec<InvestorState> {
        self.table.adjacency.get(&from).cloned().unwrap_or_default()
    }

    pub fn is_terminal_state(&self, state: InvestorState) -> bool {
        self.valid_transitions(state).is_empty()
    }

    pub fn all_states(&self) -> &'static [InvestorState] {
        &InvestorState::ALL
    }

    /// Shortest sequence of legal transitions from `from` to `to` (inclusive)
    pub fn state_transition_path(
        &self,
        from: InvestorState,
        to: InvestorState,
    ) -> Result<Vec<InvestorState>, LifecycleError> {
        if from == to {
            return Ok(vec![from]);
        }

        let mut parent: HashMap<InvestorState, InvestorState> = HashMap::new();
        let mut queue = VecDeque::from([from]);

        while let Some(current) = queue.pop_front() {
            for next in self.valid_transitions(current) {
                if next == from || parent.contains_key(&next) {
                    continue;
                }
                parent.insert(next, current);
                if next == to {
                    return Ok(Self::unwind(&parent, from, to));
                }
                queue.push_back(next);
            }
        }

        Err(LifecycleError::NoPathExists { from, to })
    }

    fn unwind(
        parent: &HashMap<InvestorState, InvestorState>,
        from: InvestorState,
        to: InvestorState,
    ) -> Vec<InvestorState> {
        let mut path = vec![to];
        let mut cursor = to;
        while cursor != from {
            match parent.get(&cursor) {
                Some(prev) => {
                    path.push(*prev);
                    cursor = *prev;
                }
                None => break,
            }
        }
        path.reverse();
        path
    }

    // ------------------------------------------------------------------
    // Name-based boundary (states arriving as strings from DSL / storage)
    // ------------------------------------------------------------------

    /// Like [`Self::can_transition`]; unknown names are never transitionable
    pub fn can_transition_named(&self, from: &str, to: &str) -> bool {
        match (from.parse(), to.parse()) {
            (Ok(from), Ok(to)) => self.can_transition(from, to),
            _ => false,
        }
    }

    /// Like [`Self::is_terminal_state`]; unknown names cannot progress
    pub fn is_terminal_named(&self, state: &str) -> bool {
        state
            .parse()
            .map(|s| self.is_terminal_state(s))
            .unwrap_or(true)
    }

    pub fn state_transition_path_named(
        &self,
        from: &str,
        to: &str,
    ) -> Result<Vec<InvestorState>, LifecycleError> {
        let from: InvestorState = from.parse()?;
        let to: InvestorState = to.parse()?;
        self.state_transition_path(from, to)
    }

    // ------------------------------------------------------------------
    // Validation and mutation
    // ------------------------------------------------------------------

    /// Check the edge and evaluate its guards in registration order
    pub fn validate_transition(
        &self,
        entity: &LifecycleEntity,
        to: InvestorState,
        context: &GuardContext,
    ) -> Result<(), LifecycleError> {
        let from = entity.state();
        if !self.can_transition(from, to) {
            return Err(LifecycleError::InvalidTransition { from, to });
        }

        for guard in self.guard_conditions(from, to) {
            let passed = guard.check(context);
            debug!(
                entity_id = %entity.entity_id(),
                guard = guard.name,
                passed,
                "evaluated guard {} -> {}",
                from,
                to
            );
            if !passed {
                return Err(LifecycleError::GuardConditionFailed {
                    name: guard.name.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Validate and apply a transition, returning its audit record.
    ///
    /// On failure the entity is left untouched.
    pub fn transition_state(
        &self,
        entity: &mut LifecycleEntity,
        to: InvestorState,
        trigger_verb: &str,
        context: &GuardContext,
        actor: &str,
    ) -> Result<LifecycleTransitionRecord, LifecycleError> {
        self.validate_transition(entity, to, context)?;

        let from = entity.state();
        let sequence = entity.advance(to);

        info!(
            entity_id = %entity.entity_id(),
            verb = trigger_verb,
            actor,
            "lifecycle transition {} -> {}",
            from,
            to
        );

        Ok(LifecycleTransitionRecord {
            record_id: Uuid::new_v4(),
            entity_id: entity.entity_id(),
            from_state: Some(from),
            to_state: to,
            trigger_verb: trigger_verb.to_string(),
            actor: actor.to_string(),
            transitioned_at: Utc::now(),
            sequence,
            context: context.clone(),
        })
    }

    /// Bring a new entity into the lifecycle at the initial state
    pub fn initialize(
        &self,
        entity_id: Uuid,
        trigger_verb: &str,
        actor: &str,
    ) -> (LifecycleEntity, LifecycleTransitionRecord) {
        let entity = LifecycleEntity::new(entity_id, InvestorState::INITIAL);
        let record = LifecycleTransitionRecord {
            record_id: Uuid::new_v4(),
            entity_id,
            from_state: None,
            to_state: InvestorState::INITIAL,
            trigger_verb: trigger_verb.to_string(),
            actor: actor.to_string(),
            transitioned_at: Utc::now(),
            sequence: 0,
            context: GuardContext::new(),
        };
        (entity, record)
    }
}
