//! The per-turn orchestration loop and the pieces around it.
//!
//! A turn runs: NLU classification, routing, step execution against a working
//! copy of the flow stack, then a single guarded commit through the state
//! machine. Compiled flows live in a [`FlowRegistry`] shared by every
//! [`Session`]; a [`SessionPool`] keeps many sessions apart and can process
//! their turns in parallel.

mod collaborators;
mod executor;
mod pool;
mod registry;
mod session;
mod snapshot;

pub use collaborators::{
    ActionExecutor, ActionResult, Classifier, NluRequest, RenderRequest, Renderer, TemplateRenderer,
};
pub use pool::SessionPool;
pub use registry::{FlowRegistry, FlowSet};
pub use session::{Orchestrator, Session, TurnOutcome};
pub use snapshot::SessionSnapshot;
