//! Decides, per turn, whether a message continues the current step or triggers
//! a conversational pattern (correction, digression, cancellation, ...).
//!
//! Routing is pure: it reads the classification and the session state and
//! returns a [`RoutingDecision`] for the orchestrator to carry out.

use crate::compiler::{StepKind, StepNode};
use crate::expression::Value;
use crate::state::SessionState;
use tracing::{debug, warn};

mod classification;

pub use classification::{Classification, MessageType};

#[derive(Debug, Clone, PartialEq)]
pub enum RoutingDecision {
    /// Hand the message to the current step.
    Continue,
    /// Overwrite already collected slots and stay on the current step.
    UpdateSlots { slots: Vec<(String, Value)> },
    /// Answer to the question posed by a confirm step.
    ResolveConfirmation { affirmed: bool },
    /// Answer to a pending request to switch flows.
    ResolveIntentChange { accepted: bool },
    /// Ask the current question again.
    Reprompt,
    /// Answer an off-topic message, then return to the current step.
    Digress { depth: u32 },
    /// Too many digressions in a row.
    DigressionLimit { depth: u32 },
    /// Ask before abandoning the executing flow for `flow_id`.
    ConfirmIntentChange { flow_id: String },
    StartFlow { flow_id: String },
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Router {
    max_digression_depth: u32,
}

impl Router {
    pub fn new(max_digression_depth: u32) -> Self {
        Self {
            max_digression_depth,
        }
    }

    pub fn max_digression_depth(&self) -> u32 {
        self.max_digression_depth
    }

    pub fn route(
        &self,
        current: Option<&StepNode>,
        classification: &Classification,
        state: &SessionState,
    ) -> RoutingDecision {
        let decision = self.decide(current, classification, state);
        debug!(
            message_type = ?classification.message_type,
            step = current.map(|n| n.name()).unwrap_or("-"),
            ?decision,
            "routed turn"
        );
        decision
    }

    fn decide(
        &self,
        current: Option<&StepNode>,
        classification: &Classification,
        state: &SessionState,
    ) -> RoutingDecision {
        let flow_active = !state.flow_stack().is_empty();
        let pending = state.metadata().pending_intent_change();
        let at_confirm = matches!(current.map(|n| n.kind()), Some(StepKind::Confirm { .. }));

        match classification.message_type {
            MessageType::Cancellation => return RoutingDecision::Cancel,
            MessageType::Correction | MessageType::Modification if flow_active => {
                return if classification.slots.is_empty() {
                    RoutingDecision::Reprompt
                } else {
                    RoutingDecision::UpdateSlots {
                        slots: classification.slots.clone(),
                    }
                };
            }
            MessageType::Confirmation if pending.is_some() => {
                return match classification.polarity() {
                    Some(accepted) => RoutingDecision::ResolveIntentChange { accepted },
                    None => RoutingDecision::Reprompt,
                };
            }
            MessageType::Confirmation if at_confirm => {
                return match classification.polarity() {
                    Some(affirmed) => RoutingDecision::ResolveConfirmation { affirmed },
                    None => RoutingDecision::Reprompt,
                };
            }
            MessageType::Digression | MessageType::Clarification | MessageType::Question => {
                let depth = state.metadata().digression_depth();
                return if depth < self.max_digression_depth {
                    RoutingDecision::Digress { depth: depth + 1 }
                } else {
                    RoutingDecision::DigressionLimit { depth }
                };
            }
            MessageType::IntentChange => {
                if let Some(flow_id) = classification.command.as_deref() {
                    return match state.active_flow() {
                        None => RoutingDecision::StartFlow {
                            flow_id: flow_id.to_string(),
                        },
                        Some(active) if active == flow_id => RoutingDecision::Continue,
                        Some(_) => RoutingDecision::ConfirmIntentChange {
                            flow_id: flow_id.to_string(),
                        },
                    };
                }
            }
            MessageType::Unrecognized => {
                warn!(
                    command = classification.command.as_deref().unwrap_or("-"),
                    "unrecognized message type; continuing the current step"
                );
                return RoutingDecision::Continue;
            }
            _ => {}
        }

        if pending.is_some() {
            return RoutingDecision::Reprompt;
        }
        match (&classification.command, classification.message_type) {
            (Some(flow_id), MessageType::Continuation) if !flow_active => {
                RoutingDecision::StartFlow {
                    flow_id: flow_id.clone(),
                }
            }
            _ => RoutingDecision::Continue,
        }
    }
}
