use super::{ConversationState, Metadata, SessionState, TurnRecord};
use crate::router::Classification;
use crate::stack::FlowStack;

/// A batch of changes to a [`SessionState`], applied all at once or not at all.
///
/// Fields left untouched keep their current value.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub(super) conversation_state: Option<ConversationState>,
    pub(super) flow_stack: Option<FlowStack>,
    pub(super) waiting_for_slot: Option<Option<String>>,
    pub(super) turn_count: Option<u64>,
    pub(super) increment_turn: bool,
    pub(super) metadata: Option<Metadata>,
    pub(super) digression_depth: Option<u32>,
    pub(super) pending_intent_change: Option<Option<String>>,
    pub(super) counter_increments: Vec<String>,
    pub(super) last_classification: Option<Option<Classification>>,
    pub(super) last_response: Option<Option<String>>,
    pub(super) history: Option<Vec<TurnRecord>>,
    pub(super) recorded_turns: Vec<TurnRecord>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// An update that only moves the conversation to `state`.
    pub fn transition(state: ConversationState) -> Self {
        Self::new().to(state)
    }

    /// Replaces every field with the contents of `state`.
    pub(crate) fn replacing(state: SessionState) -> Self {
        Self {
            conversation_state: Some(state.conversation_state),
            flow_stack: Some(state.flow_stack),
            waiting_for_slot: Some(state.waiting_for_slot),
            turn_count: Some(state.turn_count),
            metadata: Some(state.metadata),
            last_classification: Some(state.last_classification),
            last_response: Some(state.last_response),
            history: Some(state.history),
            ..Self::default()
        }
    }

    pub fn to(mut self, state: ConversationState) -> Self {
        self.conversation_state = Some(state);
        self
    }

    pub fn with_stack(mut self, stack: FlowStack) -> Self {
        self.flow_stack = Some(stack);
        self
    }

    pub fn waiting_for(mut self, slot: Option<&str>) -> Self {
        self.waiting_for_slot = Some(slot.map(str::to_string));
        self
    }

    pub fn incrementing_turn(mut self) -> Self {
        self.increment_turn = true;
        self
    }

    pub fn with_digression_depth(mut self, depth: u32) -> Self {
        self.digression_depth = Some(depth);
        self
    }

    pub fn with_pending_intent_change(mut self, flow_id: Option<&str>) -> Self {
        self.pending_intent_change = Some(flow_id.map(str::to_string));
        self
    }

    pub fn incrementing_counter(mut self, name: &str) -> Self {
        self.counter_increments.push(name.to_string());
        self
    }

    pub fn with_classification(mut self, classification: Option<Classification>) -> Self {
        self.last_classification = Some(classification);
        self
    }

    pub fn with_response(mut self, response: Option<&str>) -> Self {
        self.last_response = Some(response.map(str::to_string));
        self
    }

    /// Appends a turn to the history; the oldest turns fall off past the history window.
    pub fn recording(mut self, turn: TurnRecord) -> Self {
        self.recorded_turns.push(turn);
        self
    }

    pub(super) fn apply_to(self, state: &mut SessionState, history_window: usize) {
        if let Some(next) = self.conversation_state {
            state.conversation_state = next;
        }
        if let Some(stack) = self.flow_stack {
            state.flow_stack = stack;
        }
        if let Some(slot) = self.waiting_for_slot {
            state.waiting_for_slot = slot;
        }
        if let Some(count) = self.turn_count {
            state.turn_count = count;
        }
        if self.increment_turn {
            state.turn_count += 1;
        }
        if let Some(metadata) = self.metadata {
            state.metadata = metadata;
        }
        if let Some(depth) = self.digression_depth {
            state.metadata.set_digression_depth(depth);
        }
        if let Some(pending) = self.pending_intent_change {
            state.metadata.set_pending_intent_change(pending);
        }
        for name in &self.counter_increments {
            state.metadata.increment(name);
        }
        if let Some(classification) = self.last_classification {
            state.last_classification = classification;
        }
        if let Some(response) = self.last_response {
            state.last_response = response;
        }
        if let Some(history) = self.history {
            state.history = history;
        }
        state.history.extend(self.recorded_turns);
        if state.history.len() > history_window {
            let excess = state.history.len() - history_window;
            state.history.drain(..excess);
        }
    }
}
