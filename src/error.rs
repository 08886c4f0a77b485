use crate::expression::Value;
use crate::state::ConversationState;
use thiserror::Error;

/// Errors raised while parsing or evaluating a condition expression.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("Condition is empty")]
    Empty,

    #[error("Unterminated string literal starting at position {position}")]
    UnterminatedString { position: usize },

    #[error("Unexpected character '{character}' at position {position}")]
    UnexpectedCharacter { character: char, position: usize },

    #[error("Unexpected token '{found}', expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: &'static str,
    },

    #[error("Condition ended early, expected {expected}")]
    UnexpectedEnd { expected: &'static str },

    #[error("Cannot apply '{operator}' to '{left}' and '{right}'")]
    Incomparable {
        operator: &'static str,
        left: Value,
        right: Value,
    },
}

/// A malformed flow definition. Raised at compile time, never while a session is running.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Flow '{0}' is defined more than once")]
    DuplicateFlow(String),

    #[error("Step '{step}' is defined more than once in flow '{flow_id}'")]
    DuplicateStep { flow_id: String, step: String },

    #[error("Step name '{step}' in flow '{flow_id}' is reserved for the terminal marker")]
    ReservedStepName { flow_id: String, step: String },

    #[error("Step '{step}' in flow '{flow_id}' is missing required field '{field}'")]
    MissingField {
        flow_id: String,
        step: String,
        field: &'static str,
    },

    #[error("Step '{step}' in flow '{flow_id}' targets unknown step '{target}'")]
    UnresolvedTarget {
        flow_id: String,
        step: String,
        target: String,
    },

    #[error("Step '{step}' in flow '{flow_id}' jumps to unknown step '{target}'")]
    UnresolvedJump {
        flow_id: String,
        step: String,
        target: String,
    },

    #[error("Step '{step}' in flow '{flow_id}' has an invalid case label '{label}'")]
    InvalidCaseLabel {
        flow_id: String,
        step: String,
        label: String,
    },

    #[error("Loop '{step}' in flow '{flow_id}' has an invalid body: {message}")]
    InvalidLoopBody {
        flow_id: String,
        step: String,
        message: String,
    },

    #[error("Step '{step}' in flow '{flow_id}' closes more than one loop")]
    SharedLoopTail { flow_id: String, step: String },

    #[error("Step '{step}' in flow '{flow_id}' has a malformed condition: {source}")]
    InvalidCondition {
        flow_id: String,
        step: String,
        #[source]
        source: EvaluationError,
    },

    #[error("Step '{step}' in flow '{flow_id}' refers to unknown flow '{target}'")]
    UnknownFlow {
        flow_id: String,
        step: String,
        target: String,
    },

    #[error("Invalid runtime settings: {0}")]
    InvalidSettings(String),
}

/// The compiler could not resolve a step's `type` tag.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Step '{step}' in flow '{flow_id}' has an unregistered step type: '{type_name}'")]
pub struct UnknownStepTypeError {
    pub flow_id: String,
    pub step: String,
    pub type_name: String,
}

/// Errors that can occur while compiling flow definitions into step graphs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    UnknownStepType(#[from] UnknownStepTypeError),
}

/// A transition that is not present in the conversation state table.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Illegal conversation state transition from '{from}' to '{to}'")]
pub struct InvalidTransitionError {
    pub from: ConversationState,
    pub to: ConversationState,
}

/// A rejected state update. The session state is left untouched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateError {
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransitionError),

    #[error("Inconsistent session state: {0}")]
    Inconsistent(String),
}

/// Errors raised by flow stack operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowStackError {
    #[error("The flow stack is empty")]
    Empty,

    #[error("Cannot start a root flow while '{active_flow}' is on the stack")]
    NotEmpty { active_flow: String },

    #[error("Flow '{flow_id}' at the top of the stack is not active")]
    NotActive { flow_id: String },

    #[error("Flow '{flow_id}' has not completed and cannot be returned from")]
    NotCompleted { flow_id: String },

    #[error("Flow '{flow_id}' has no caller frame to return to")]
    NoCallerFrame { flow_id: String },

    #[error("Flow '{flow_id}' was called and must return to its caller instead of finishing")]
    CallerPending { flow_id: String },

    #[error("Inconsistent flow stack: {0}")]
    Inconsistent(String),
}

/// A failure reported by an external collaborator (NLU or action backend).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("Classification failed: {0}")]
    Classification(String),

    #[error("Action '{action}' failed: {message}")]
    Action { action: String, message: String },
}

/// Errors raised while encoding or decoding a session snapshot.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SnapshotError {
    #[error("JSON snapshot error: {0}")]
    Json(String),

    #[error("Binary snapshot error: {0}")]
    Binary(String),

    #[error("Snapshot does not describe a valid session: {0}")]
    Invalid(#[from] StateError),
}

/// Errors that can occur when converting a custom user format into taiwa `FlowDefinition`s.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowConversionError {
    #[error("Invalid custom data: {0}")]
    ValidationError(String),
}

/// Errors surfaced to the caller of a session turn.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Stack(#[from] FlowStackError),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("Flow '{0}' is not registered")]
    UnknownFlow(String),

    #[error("Step '{step}' does not exist in flow '{flow_id}'")]
    MissingStep { flow_id: String, step: String },

    #[error("Step '{step}' in flow '{flow_id}' has no edge that applies")]
    NoOutgoingEdge { flow_id: String, step: String },

    #[error("Flow '{flow_id}' executed more than {limit} steps in a single turn")]
    StepLimit { flow_id: String, limit: usize },
}
