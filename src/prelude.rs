//! Prelude module for convenient imports
//!
//! This module re-exports the most commonly used types and traits from the taiwa crate.
//! Import this module to get access to the core functionality without having to import
//! each type individually.
//!
//! # Example
//!
//! ```rust,no_run
//! use taiwa::prelude::*;
//!
//! # fn run_example() -> Result<()> {
//! let flow = FlowDefinition::new("greet", "Say hello")
//!     .with_step(StepDefinition::collect("ask_name", "name"))
//!     .with_step(StepDefinition::say("hello", "greeting"));
//!
//! let graph = Compiler::default().compile(&flow)?;
//! println!("{}", graph);
//! # Ok(())
//! # }
//! ```

// Flow definitions and compilation
pub use crate::compiler::{Compiler, CompilerBuilder, JumpPolicy, StepGraph};
pub use crate::flow::{FlowDefinition, IntoFlows, StepDefinition};

// Expressions
pub use crate::expression::{SlotMap, Value, evaluate, parse_literal};

// Conversation state
pub use crate::router::{Classification, MessageType, RoutingDecision};
pub use crate::stack::FlowStack;
pub use crate::state::{ConversationState, SessionState};

// Runtime
pub use crate::config::RuntimeConfig;
pub use crate::runtime::{
    ActionExecutor, ActionResult, Classifier, FlowRegistry, NluRequest, Orchestrator, RenderRequest,
    Renderer, Session, SessionPool, SessionSnapshot, TemplateRenderer, TurnOutcome,
};

// Error types
pub use crate::error::{
    CollaboratorError, CompileError, ConfigError, EvaluationError, FlowConversionError,
    FlowStackError, RuntimeError, StateError,
};

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
