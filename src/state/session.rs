use super::ConversationState;
use crate::router::Classification;
use crate::stack::FlowStack;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub speaker: Speaker,
    pub text: String,
}

impl TurnRecord {
    pub fn user(text: &str) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.to_string(),
        }
    }

    pub fn assistant(text: &str) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.to_string(),
        }
    }
}

/// Bookkeeping that does not belong to any single flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    digression_depth: u32,
    pending_intent_change: Option<String>,
    counters: AHashMap<String, u64>,
}

impl Metadata {
    /// Consecutive non-productive digressions since the last step advance.
    pub fn digression_depth(&self) -> u32 {
        self.digression_depth
    }

    /// The flow the user asked to switch to, awaiting their confirmation.
    pub fn pending_intent_change(&self) -> Option<&str> {
        self.pending_intent_change.as_deref()
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn counters(&self) -> &AHashMap<String, u64> {
        &self.counters
    }

    pub(super) fn set_digression_depth(&mut self, depth: u32) {
        self.digression_depth = depth;
    }

    pub(super) fn set_pending_intent_change(&mut self, flow_id: Option<String>) {
        self.pending_intent_change = flow_id;
    }

    pub(super) fn increment(&mut self, name: &str) {
        *self.counters.entry(name.to_string()).or_insert(0) += 1;
    }
}

/// Everything the runtime knows about one conversation.
///
/// Read-only from the outside; every change goes through
/// [`StateMachine::update`](super::StateMachine::update).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub(super) conversation_state: ConversationState,
    pub(super) flow_stack: FlowStack,
    pub(super) waiting_for_slot: Option<String>,
    pub(super) turn_count: u64,
    pub(super) metadata: Metadata,
    pub(super) last_classification: Option<Classification>,
    pub(super) last_response: Option<String>,
    pub(super) history: Vec<TurnRecord>,
}

impl SessionState {
    pub fn conversation_state(&self) -> ConversationState {
        self.conversation_state
    }

    pub fn flow_stack(&self) -> &FlowStack {
        &self.flow_stack
    }

    /// The slot the current collect step is asking for.
    pub fn waiting_for_slot(&self) -> Option<&str> {
        self.waiting_for_slot.as_deref()
    }

    pub fn turn_count(&self) -> u64 {
        self.turn_count
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn last_classification(&self) -> Option<&Classification> {
        self.last_classification.as_ref()
    }

    pub fn last_response(&self) -> Option<&str> {
        self.last_response.as_deref()
    }

    /// Recent turns, oldest first.
    pub fn history(&self) -> &[TurnRecord] {
        &self.history
    }

    /// The flow id of the executing instance, if any.
    pub fn active_flow(&self) -> Option<&str> {
        self.flow_stack.top().map(|top| top.flow_id())
    }
}
