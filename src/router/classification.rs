use crate::expression::Value;
use serde::{Deserialize, Serialize};

/// What the user's message does to the conversation, as judged by the NLU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Continuation,
    Correction,
    Modification,
    Confirmation,
    Cancellation,
    Digression,
    Clarification,
    IntentChange,
    Question,
    /// Any label this runtime does not know.
    #[serde(other)]
    Unrecognized,
}

/// The NLU's reading of one user turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub message_type: MessageType,
    /// A flow id for intent changes, or a yes/no keyword for confirmations.
    pub command: Option<String>,
    pub slots: Vec<(String, Value)>,
    pub confidence: f32,
}

impl Classification {
    pub fn new(message_type: MessageType) -> Self {
        Self {
            message_type,
            command: None,
            slots: Vec::new(),
            confidence: 1.0,
        }
    }

    pub fn with_command(mut self, command: &str) -> Self {
        self.command = Some(command.to_string());
        self
    }

    pub fn with_slot(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.slots.push((name.to_string(), value.into()));
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn slot(&self, name: &str) -> Option<&Value> {
        self.slots.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Yes or no, read from the command keyword first and then from the first boolean slot.
    pub fn polarity(&self) -> Option<bool> {
        let from_command = self.command.as_deref().and_then(|command| {
            match command.trim().to_ascii_lowercase().as_str() {
                "affirm" | "yes" | "confirm" | "true" => Some(true),
                "deny" | "no" | "reject" | "false" => Some(false),
                _ => None,
            }
        });
        from_command.or_else(|| {
            self.slots.iter().find_map(|(_, value)| match value {
                Value::Bool(b) => Some(*b),
                _ => None,
            })
        })
    }
}
