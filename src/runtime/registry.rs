use crate::compiler::{Compiler, StepGraph};
use crate::config::RuntimeConfig;
use crate::error::CompileError;
use crate::flow::FlowDefinition;
use ahash::AHashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

/// One compiled, immutable generation of flows.
#[derive(Debug, Default)]
pub struct FlowSet {
    graphs: AHashMap<String, StepGraph>,
    generation: u64,
}

impl FlowSet {
    pub fn get(&self, flow_id: &str) -> Option<&StepGraph> {
        self.graphs.get(flow_id)
    }

    pub fn contains(&self, flow_id: &str) -> bool {
        self.graphs.contains_key(flow_id)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn flow_ids(&self) -> impl Iterator<Item = &str> {
        self.graphs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }
}

/// Compiled flows shared by every session.
///
/// A turn takes an `Arc` to the current [`FlowSet`] when it starts and runs
/// against it to completion; [`FlowRegistry::reload`] swaps in a new set without
/// disturbing turns that hold the old one.
#[derive(Debug)]
pub struct FlowRegistry {
    compiler: Compiler,
    current: RwLock<Arc<FlowSet>>,
}

impl FlowRegistry {
    pub fn new(compiler: Compiler, flows: &[FlowDefinition]) -> Result<Self, CompileError> {
        let graphs = compiler.compile_all(flows)?;
        info!(flows = graphs.len(), "flow registry ready");
        Ok(Self {
            compiler,
            current: RwLock::new(Arc::new(FlowSet {
                graphs,
                generation: 0,
            })),
        })
    }

    /// Compiles `flows` with the jump policy from `config`.
    pub fn from_config(config: &RuntimeConfig, flows: &[FlowDefinition]) -> Result<Self, CompileError> {
        let compiler = Compiler::builder()
            .with_jump_policy(config.jump_policy)
            .build();
        Self::new(compiler, flows)
    }

    pub fn snapshot(&self) -> Arc<FlowSet> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation
    }

    /// Compiles a complete replacement set and swaps it in. On error the current set stays.
    pub fn reload(&self, flows: &[FlowDefinition]) -> Result<u64, CompileError> {
        let graphs = self.compiler.compile_all(flows)?;
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let generation = current.generation + 1;
        *current = Arc::new(FlowSet { graphs, generation });
        info!(generation, flows = current.len(), "reloaded flows");
        Ok(generation)
    }
}
