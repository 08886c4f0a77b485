//! Compiles declarative [`FlowDefinition`]s into executable [`StepGraph`]s.
//!
//! Every step becomes a node with an ordered list of guarded edges. Sequential
//! steps flow into their successor, `jump_to` overrides the successor, branch
//! cases become conditional edges with an `Otherwise` fallback, and loop bodies
//! close with a back-edge to their `while` head. Compilation fails fast on
//! anything that would make a flow ambiguous at runtime.

use crate::error::{CompileError, ConfigError, UnknownStepTypeError};
use crate::flow::{FlowDefinition, StepDefinition};
use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

mod builder;
mod factory;
mod graph;

use builder::GraphBuilder;
use factory::{build_kind, register_default_types};

pub use factory::StepType;
pub use graph::{Edge, Guard, StepGraph, StepKind, StepNode, Target};

/// How the compiler treats a `jump_to` naming a step that does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JumpPolicy {
    /// Log a warning and end the flow at that point.
    #[default]
    Lenient,
    /// Reject the flow with [`ConfigError::UnresolvedJump`].
    Strict,
}

#[derive(Debug, Clone)]
pub struct Compiler {
    registry: AHashMap<String, StepType>,
    jump_policy: JumpPolicy,
}

#[derive(Debug, Clone)]
pub struct CompilerBuilder {
    registry: AHashMap<String, StepType>,
    jump_policy: JumpPolicy,
}

impl Default for CompilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CompilerBuilder {
    pub fn new() -> Self {
        let mut registry = AHashMap::new();
        register_default_types(&mut registry);
        Self {
            registry,
            jump_policy: JumpPolicy::default(),
        }
    }

    /// Lets flows use `user_type_name` as a `type` tag for one of the built-in step types.
    pub fn with_type_alias(mut self, user_type_name: &str, step_type_name: &str) -> Self {
        match StepType::from_tag(step_type_name) {
            Some(step_type) => {
                self.registry.insert(user_type_name.to_string(), step_type);
            }
            None => warn!(
                alias = user_type_name,
                step_type = step_type_name,
                "ignoring alias for unknown step type"
            ),
        }
        self
    }

    pub fn with_jump_policy(mut self, jump_policy: JumpPolicy) -> Self {
        self.jump_policy = jump_policy;
        self
    }

    pub fn build(self) -> Compiler {
        Compiler {
            registry: self.registry,
            jump_policy: self.jump_policy,
        }
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Compiler {
    pub fn builder() -> CompilerBuilder {
        CompilerBuilder::new()
    }

    pub fn jump_policy(&self) -> JumpPolicy {
        self.jump_policy
    }

    /// Compiles a single flow. Call and link targets are not checked here; see
    /// [`Compiler::compile_all`].
    pub fn compile(&self, flow: &FlowDefinition) -> Result<StepGraph, CompileError> {
        let mut builder = GraphBuilder::new(flow, self.jump_policy)?;

        let kinds = flow
            .steps
            .iter()
            .map(|step| -> Result<StepKind, CompileError> {
                let step_type = self.resolve_type(flow, step)?;
                Ok(build_kind(&flow.id, step, step_type)?)
            })
            .collect::<Result<Vec<_>, _>>()?;

        builder.register_loops(&kinds)?;
        let edges = builder.wire(&kinds)?;
        let graph = StepGraph::new(flow, kinds, edges);

        debug!(flow = %flow.id, steps = graph.len(), "compiled flow");
        Ok(graph)
    }

    /// Compiles a whole flow set, checking that ids are unique and that every
    /// call or link step refers to a flow of the set.
    pub fn compile_all(
        &self,
        flows: &[FlowDefinition],
    ) -> Result<AHashMap<String, StepGraph>, CompileError> {
        let mut ids = AHashSet::with_capacity(flows.len());
        for flow in flows {
            if !ids.insert(flow.id.as_str()) {
                return Err(ConfigError::DuplicateFlow(flow.id.clone()).into());
            }
        }

        let mut graphs = AHashMap::with_capacity(flows.len());
        for flow in flows {
            let graph = self.compile(flow)?;
            for node in graph.nodes() {
                let target = match node.kind() {
                    StepKind::Call { flow: target } | StepKind::Link { flow: target } => target,
                    _ => continue,
                };
                if !ids.contains(target.as_str()) {
                    return Err(ConfigError::UnknownFlow {
                        flow_id: flow.id.clone(),
                        step: node.name().to_string(),
                        target: target.clone(),
                    }
                    .into());
                }
            }
            graphs.insert(flow.id.clone(), graph);
        }
        Ok(graphs)
    }

    fn resolve_type(
        &self,
        flow: &FlowDefinition,
        step: &StepDefinition,
    ) -> Result<StepType, UnknownStepTypeError> {
        self.registry
            .get(step.step_type.as_str())
            .or_else(|| self.registry.get(&step.step_type.to_ascii_lowercase()))
            .copied()
            .ok_or_else(|| UnknownStepTypeError {
                flow_id: flow.id.clone(),
                step: step.name.clone(),
                type_name: step.step_type.clone(),
            })
    }
}
