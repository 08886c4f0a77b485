use super::{SessionState, StateUpdate};
use crate::error::{InvalidTransitionError, StateError};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    #[default]
    Idle,
    Understanding,
    WaitingForSlot,
    Confirming,
    ExecutingAction,
    GeneratingResponse,
    Error,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::Idle => "idle",
            ConversationState::Understanding => "understanding",
            ConversationState::WaitingForSlot => "waiting_for_slot",
            ConversationState::Confirming => "confirming",
            ConversationState::ExecutingAction => "executing_action",
            ConversationState::GeneratingResponse => "generating_response",
            ConversationState::Error => "error",
        }
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

use ConversationState::*;

/// Every legal move, keyed by source state.
pub const TRANSITIONS: &[(ConversationState, &[ConversationState])] = &[
    (Idle, &[Understanding, Error]),
    (
        Understanding,
        &[WaitingForSlot, Confirming, ExecutingAction, GeneratingResponse, Idle, Error],
    ),
    (WaitingForSlot, &[Understanding, Error]),
    (Confirming, &[Understanding, Error]),
    (ExecutingAction, &[GeneratingResponse, Error]),
    (GeneratingResponse, &[Idle, WaitingForSlot, Confirming, Error]),
    (Error, &[Understanding, Idle]),
];

pub fn can_transition(from: ConversationState, to: ConversationState) -> bool {
    TRANSITIONS
        .iter()
        .find(|(source, _)| *source == from)
        .is_some_and(|(_, targets)| targets.contains(&to))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateMode {
    Guarded,
    /// Skips the transition check. Consistency is still enforced.
    Initialize,
}

/// Sole owner and writer of a [`SessionState`].
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: SessionState,
    history_window: usize,
}

impl StateMachine {
    pub fn new(history_window: usize) -> Self {
        Self {
            state: SessionState::default(),
            history_window,
        }
    }

    /// Rebuilds a machine around a previously captured state.
    pub(crate) fn restore(state: SessionState, history_window: usize) -> Result<Self, StateError> {
        let mut machine = Self::new(history_window);
        machine.apply(StateUpdate::replacing(state), UpdateMode::Initialize)?;
        Ok(machine)
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn conversation_state(&self) -> ConversationState {
        self.state.conversation_state
    }

    pub fn history_window(&self) -> usize {
        self.history_window
    }

    pub fn into_state(self) -> SessionState {
        self.state
    }

    /// Applies `update` atomically: the transition is checked first, the remaining
    /// changes are made on a copy, and the copy is committed only if it is consistent.
    pub fn update(&mut self, update: StateUpdate) -> Result<(), StateError> {
        self.apply(update, UpdateMode::Guarded)
    }

    fn apply(&mut self, update: StateUpdate, mode: UpdateMode) -> Result<(), StateError> {
        let from = self.state.conversation_state;
        if let Some(to) = update.conversation_state {
            if mode == UpdateMode::Guarded && to != from && !can_transition(from, to) {
                return Err(InvalidTransitionError { from, to }.into());
            }
        }

        let mut working = self.state.clone();
        update.apply_to(&mut working, self.history_window);
        check_consistency(&working)?;

        if working.conversation_state != from {
            debug!(from = %from, to = %working.conversation_state, "state transition");
        }
        self.state = working;
        Ok(())
    }
}

fn check_consistency(state: &SessionState) -> Result<(), StateError> {
    let stack_empty = state.flow_stack.is_empty();
    match state.conversation_state {
        Idle if state.waiting_for_slot.is_some() => {
            return Err(StateError::Inconsistent(
                "idle while still waiting for a slot".to_string(),
            ));
        }
        Idle if state.metadata.pending_intent_change().is_some() => {
            return Err(StateError::Inconsistent(
                "idle with an unresolved intent change".to_string(),
            ));
        }
        WaitingForSlot if state.waiting_for_slot.is_none() => {
            return Err(StateError::Inconsistent(
                "waiting for a slot without naming one".to_string(),
            ));
        }
        WaitingForSlot | Confirming if stack_empty => {
            return Err(StateError::Inconsistent(format!(
                "{} with no active flow",
                state.conversation_state
            )));
        }
        _ => {}
    }
    if state.waiting_for_slot.is_some() && stack_empty {
        return Err(StateError::Inconsistent(
            "waiting for a slot with no active flow".to_string(),
        ));
    }
    state
        .flow_stack
        .check_invariants()
        .map_err(|e| StateError::Inconsistent(e.to_string()))
}
