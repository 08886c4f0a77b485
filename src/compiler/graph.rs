use super::factory::StepType;
use crate::error::EvaluationError;
use crate::expression::{Predicate, SlotMap};
use crate::flow::{END_STEP, FlowDefinition};
use ahash::{AHashMap, AHashSet};
use itertools::Itertools;
use std::fmt;

/// Where an edge leads: another step of the same flow, or the terminal marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Step(usize),
    End,
}

/// The condition under which an edge is taken.
#[derive(Debug, Clone, PartialEq)]
pub enum Guard {
    Always,
    When(Predicate),
    Unless(Predicate),
    Affirmed,
    Denied,
    Otherwise,
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Guard::Always => write!(f, "always"),
            Guard::When(p) => write!(f, "when {}", p),
            Guard::Unless(p) => write!(f, "unless {}", p),
            Guard::Affirmed => write!(f, "affirmed"),
            Guard::Denied => write!(f, "denied"),
            Guard::Otherwise => write!(f, "otherwise"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub guard: Guard,
    pub target: Target,
}

impl Edge {
    pub fn always(target: Target) -> Self {
        Self {
            guard: Guard::Always,
            target,
        }
    }
}

/// The executable form of a step, one variant per step type.
#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    Collect {
        slot: String,
        prompt: String,
        rejection: String,
        validation: Option<Predicate>,
        ask_before_filling: bool,
    },
    Action {
        action: String,
    },
    Branch,
    Confirm {
        slot: Option<String>,
        prompt: String,
    },
    Say {
        message: String,
    },
    While {
        condition: Predicate,
        body: Vec<String>,
    },
    Call {
        flow: String,
    },
    Link {
        flow: String,
    },
}

impl StepKind {
    pub fn step_type(&self) -> StepType {
        match self {
            StepKind::Collect { .. } => StepType::Collect,
            StepKind::Action { .. } => StepType::Action,
            StepKind::Branch => StepType::Branch,
            StepKind::Confirm { .. } => StepType::Confirm,
            StepKind::Say { .. } => StepType::Say,
            StepKind::While { .. } => StepType::While,
            StepKind::Call { .. } => StepType::Call,
            StepKind::Link { .. } => StepType::Link,
        }
    }

    /// Steps that stop the advance loop and wait for the user.
    pub fn awaits_input(&self) -> bool {
        matches!(self, StepKind::Collect { .. } | StepKind::Confirm { .. })
    }

    /// The template rendered when the step asks the user for something.
    pub fn prompt(&self) -> Option<&str> {
        match self {
            StepKind::Collect { prompt, .. } | StepKind::Confirm { prompt, .. } => Some(prompt),
            _ => None,
        }
    }
}

/// One compiled step together with its outgoing edges, in priority order.
#[derive(Debug, Clone, PartialEq)]
pub struct StepNode {
    name: String,
    kind: StepKind,
    edges: Vec<Edge>,
}

impl StepNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &StepKind {
        &self.kind
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }
}

/// The compiled, immutable step graph of one flow.
///
/// The synthetic START node is represented by [`StepGraph::entry`]; the terminal
/// marker by [`Target::End`].
#[derive(Debug, Clone, PartialEq)]
pub struct StepGraph {
    flow_id: String,
    description: String,
    entry: Edge,
    nodes: Vec<StepNode>,
    index: AHashMap<String, usize>,
}

impl StepGraph {
    pub(super) fn new(flow: &FlowDefinition, kinds: Vec<StepKind>, edges: Vec<Vec<Edge>>) -> Self {
        let nodes: Vec<StepNode> = flow
            .steps
            .iter()
            .zip(kinds)
            .zip(edges)
            .map(|((step, kind), edges)| StepNode {
                name: step.name.clone(),
                kind,
                edges,
            })
            .collect();
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.name.clone(), i))
            .collect();
        let entry = Edge::always(if nodes.is_empty() {
            Target::End
        } else {
            Target::Step(0)
        });

        Self {
            flow_id: flow.id.clone(),
            description: flow.description.clone(),
            entry,
            nodes,
            index,
        }
    }

    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// The single edge leaving START.
    pub fn entry(&self) -> &Edge {
        &self.entry
    }

    pub fn nodes(&self) -> &[StepNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> Option<&StepNode> {
        self.nodes.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn step(&self, name: &str) -> Option<&StepNode> {
        self.index_of(name).and_then(|i| self.nodes.get(i))
    }

    pub fn edges_from(&self, name: &str) -> Option<&[Edge]> {
        self.step(name).map(|n| n.edges())
    }

    pub fn target_name(&self, target: Target) -> &str {
        match target {
            Target::Step(i) => self.nodes.get(i).map_or(END_STEP, |n| n.name()),
            Target::End => END_STEP,
        }
    }

    /// Picks the first edge out of `step` whose guard holds for `slots`.
    ///
    /// Confirmation edges never match here; use [`StepGraph::confirm_target`].
    /// Returns `Ok(None)` if the step is unknown or no edge applies.
    pub fn next_target(&self, step: &str, slots: &SlotMap) -> Result<Option<Target>, EvaluationError> {
        let Some(node) = self.step(step) else {
            return Ok(None);
        };
        for edge in &node.edges {
            let taken = match &edge.guard {
                Guard::Always | Guard::Otherwise => true,
                Guard::When(p) => p.evaluate(slots)?,
                Guard::Unless(p) => !p.evaluate(slots)?,
                Guard::Affirmed | Guard::Denied => false,
            };
            if taken {
                return Ok(Some(edge.target));
            }
        }
        Ok(None)
    }

    /// Resolves the positive or negative edge of a confirm step.
    pub fn confirm_target(&self, step: &str, affirmed: bool) -> Option<Target> {
        let wanted = if affirmed { Guard::Affirmed } else { Guard::Denied };
        self.step(step)?
            .edges
            .iter()
            .find(|e| e.guard == wanted)
            .map(|e| e.target)
    }

    /// Follows unconditional edges from START. Returns the visited step names if
    /// the flow is a single straight path to the terminal marker, `None` otherwise.
    pub fn linear_path(&self) -> Option<Vec<&str>> {
        let mut path = Vec::new();
        let mut seen = AHashSet::new();
        let mut current = self.entry.target;
        while let Target::Step(i) = current {
            if !seen.insert(i) {
                return None;
            }
            let node = &self.nodes[i];
            match node.edges.as_slice() {
                [Edge {
                    guard: Guard::Always,
                    target,
                }] => {
                    path.push(node.name());
                    current = *target;
                }
                _ => return None,
            }
        }
        Some(path)
    }
}

impl fmt::Display for StepGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.description.is_empty() {
            writeln!(f, "flow {}", self.flow_id)?;
        } else {
            writeln!(f, "flow {}: {}", self.flow_id, self.description)?;
        }
        writeln!(f, "  START -> {}", self.target_name(self.entry.target))?;
        for node in &self.nodes {
            let detail = match &node.kind {
                StepKind::Collect { slot, .. } => format!(" {}", slot),
                StepKind::Action { action } => format!(" {}", action),
                StepKind::Confirm { slot: Some(slot), .. } => format!(" {}", slot),
                StepKind::While { body, .. } => format!(" do [{}]", body.iter().join(", ")),
                StepKind::Call { flow } | StepKind::Link { flow } => format!(" {}", flow),
                StepKind::Say { message } => format!(" {}", message),
                StepKind::Branch | StepKind::Confirm { slot: None, .. } => String::new(),
            };
            match node.edges.as_slice() {
                [Edge {
                    guard: Guard::Always,
                    target,
                }] => writeln!(
                    f,
                    "  {} [{}{}] -> {}",
                    node.name,
                    node.kind.step_type().tag(),
                    detail,
                    self.target_name(*target)
                )?,
                edges => {
                    writeln!(f, "  {} [{}{}]", node.name, node.kind.step_type().tag(), detail)?;
                    for edge in edges {
                        writeln!(f, "    {} -> {}", edge.guard, self.target_name(edge.target))?;
                    }
                }
            }
        }
        Ok(())
    }
}
