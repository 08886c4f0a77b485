//! # Taiwa - Dialogue Orchestration Runtime
//!
//! **Taiwa** drives task-oriented conversations. Conversational flows are written
//! declaratively as ordered steps (collect a slot, call an action, branch, loop,
//! confirm, say something), compiled ahead of time into step graphs, and then
//! executed turn by turn for any number of independent sessions.
//!
//! ## Core Workflow
//!
//! 1.  **Describe Your Flows**: Load your own flow format and implement `IntoFlows` to
//!     translate it into Taiwa's `FlowDefinition`.
//! 2.  **Compile**: A `FlowRegistry` compiles every flow into a `StepGraph` and shares
//!     the result between sessions.
//! 3.  **Plug In Collaborators**: Provide a `Classifier` (your NLU), an `ActionExecutor`
//!     (your side effects) and a `Renderer` (your response templates).
//! 4.  **Converse**: Feed user messages to a `Session`. Each turn is classified, routed
//!     through the interruption patterns (corrections, digressions, cancellation,
//!     intent changes), executed against the flow, and committed atomically.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use taiwa::prelude::*;
//!
//! struct Keywords;
//!
//! impl Classifier for Keywords {
//!     fn classify(&self, request: &NluRequest<'_>) -> std::result::Result<Classification, CollaboratorError> {
//!         Ok(match request.text {
//!             "cancel" => Classification::new(MessageType::Cancellation),
//!             "transfer" => Classification::new(MessageType::IntentChange).with_command("transfer"),
//!             _ => Classification::new(MessageType::Continuation),
//!         })
//!     }
//! }
//!
//! struct Bank;
//!
//! impl ActionExecutor for Bank {
//!     fn execute(&self, _action: &str, _slots: &SlotMap) -> std::result::Result<ActionResult, CollaboratorError> {
//!         Ok(ActionResult::empty().with_slot("reference", "TX-1"))
//!     }
//! }
//!
//! fn main() -> Result<()> {
//!     let transfer = FlowDefinition::new("transfer", "Send money")
//!         .with_step(StepDefinition::collect("ask_recipient", "recipient"))
//!         .with_step(StepDefinition::collect("ask_amount", "amount").with_validation("amount > 0"))
//!         .with_step(StepDefinition::action("send", "send_money"))
//!         .with_step(StepDefinition::say("done", "transfer_done"));
//!
//!     let config = RuntimeConfig::default();
//!     let registry = Arc::new(FlowRegistry::from_config(&config, &[transfer])?);
//!     let renderer = TemplateRenderer::new()
//!         .with_template("ask_recipient", "Who should receive the money?")
//!         .with_template("ask_amount", "How much?")
//!         .with_template("transfer_done", "Sent {amount} to {recipient} ({reference}).");
//!
//!     let orchestrator = Arc::new(Orchestrator::new(
//!         registry,
//!         Arc::new(Keywords),
//!         Arc::new(Bank),
//!         Arc::new(renderer),
//!         config,
//!     ));
//!
//!     let mut session = Session::new("user-1", orchestrator);
//!     for text in ["transfer", "Ana", "50"] {
//!         let outcome = session.handle_turn(text)?;
//!         for response in &outcome.responses {
//!             println!("{}", response);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod compiler;
pub mod config;
pub mod error;
pub mod expression;
pub mod flow;
pub mod prelude;
pub mod router;
pub mod runtime;
pub mod stack;
pub mod state;
