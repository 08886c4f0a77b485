use super::JumpPolicy;
use super::graph::{Edge, Guard, StepKind, Target};
use crate::error::ConfigError;
use crate::expression::Predicate;
use crate::flow::{END_STEP, FlowDefinition};
use ahash::AHashMap;
use tracing::warn;

/// Responsible for wiring the outgoing edges of every step of a `FlowDefinition`.
pub(super) struct GraphBuilder<'a> {
    flow: &'a FlowDefinition,
    jump_policy: JumpPolicy,
    index: AHashMap<&'a str, usize>,
    // Last body step -> its loop head.
    loop_tails: AHashMap<usize, usize>,
}

impl<'a> GraphBuilder<'a> {
    pub(super) fn new(flow: &'a FlowDefinition, jump_policy: JumpPolicy) -> Result<Self, ConfigError> {
        let mut index = AHashMap::with_capacity(flow.steps.len());
        for (i, step) in flow.steps.iter().enumerate() {
            if step.name == END_STEP {
                return Err(ConfigError::ReservedStepName {
                    flow_id: flow.id.clone(),
                    step: step.name.clone(),
                });
            }
            if index.insert(step.name.as_str(), i).is_some() {
                return Err(ConfigError::DuplicateStep {
                    flow_id: flow.id.clone(),
                    step: step.name.clone(),
                });
            }
        }

        Ok(Self {
            flow,
            jump_policy,
            index,
            loop_tails: AHashMap::new(),
        })
    }

    /// Records the back-edge of every loop. Must run before [`GraphBuilder::wire`].
    pub(super) fn register_loops(&mut self, kinds: &[StepKind]) -> Result<(), ConfigError> {
        for (head, kind) in kinds.iter().enumerate() {
            let StepKind::While { body, .. } = kind else {
                continue;
            };
            let mut last = None;
            for name in body {
                match self.index.get(name.as_str()) {
                    Some(&i) if i != head => last = Some(i),
                    Some(_) => return Err(self.loop_error(head, "a loop cannot contain itself")),
                    None => {
                        return Err(self.loop_error(head, &format!("unknown body step '{}'", name)));
                    }
                }
            }
            let Some(tail) = last else {
                return Err(self.loop_error(head, "the `do` list is empty"));
            };
            if self.loop_tails.insert(tail, head).is_some() {
                return Err(ConfigError::SharedLoopTail {
                    flow_id: self.flow.id.clone(),
                    step: self.flow.steps[tail].name.clone(),
                });
            }
        }
        Ok(())
    }

    pub(super) fn wire(&self, kinds: &[StepKind]) -> Result<Vec<Vec<Edge>>, ConfigError> {
        kinds
            .iter()
            .enumerate()
            .map(|(i, kind)| self.edges_for(i, kind))
            .collect()
    }

    fn edges_for(&self, i: usize, kind: &StepKind) -> Result<Vec<Edge>, ConfigError> {
        match kind {
            StepKind::Branch => self.branch_edges(i),
            StepKind::Confirm { .. } => self.confirm_edges(i),
            StepKind::While { condition, body } => {
                let first = body
                    .first()
                    .and_then(|name| self.index.get(name.as_str()))
                    .copied()
                    .ok_or_else(|| self.loop_error(i, "the `do` list is empty"))?;
                Ok(vec![
                    Edge {
                        guard: Guard::When(condition.clone()),
                        target: Target::Step(first),
                    },
                    Edge {
                        guard: Guard::Otherwise,
                        target: self.loop_exit(i, body)?,
                    },
                ])
            }
            _ => Ok(vec![Edge::always(self.default_target(i)?)]),
        }
    }

    fn branch_edges(&self, i: usize) -> Result<Vec<Edge>, ConfigError> {
        let step = &self.flow.steps[i];
        let condition = step
            .condition
            .as_deref()
            .map(|source| self.predicate(i, source))
            .transpose()?;

        let mut edges = Vec::with_capacity(step.cases.len() + 1);
        let mut fallback = None;
        for case in &step.cases {
            let target = self.case_target(i, &case.target)?;
            let label = case.label.trim();
            let guard = match (label.to_ascii_lowercase().as_str(), &condition) {
                ("else" | "default", _) => {
                    if fallback.replace(target).is_some() {
                        return Err(self.label_error(i, label));
                    }
                    continue;
                }
                ("true", Some(cond)) => Guard::When(cond.clone()),
                ("false", Some(cond)) => Guard::Unless(cond.clone()),
                (_, Some(_)) => return Err(self.label_error(i, label)),
                (_, None) => Guard::When(self.predicate(i, label)?),
            };
            edges.push(Edge { guard, target });
        }

        let fallback = match fallback {
            Some(target) => target,
            None => self.default_target(i)?,
        };
        edges.push(Edge {
            guard: Guard::Otherwise,
            target: fallback,
        });
        Ok(edges)
    }

    fn confirm_edges(&self, i: usize) -> Result<Vec<Edge>, ConfigError> {
        let step = &self.flow.steps[i];
        let mut affirm = None;
        let mut deny = None;
        for case in &step.cases {
            let target = self.case_target(i, &case.target)?;
            let label = case.label.trim();
            let slot = match label.to_ascii_lowercase().as_str() {
                "yes" | "affirm" | "true" => &mut affirm,
                "no" | "deny" | "false" => &mut deny,
                _ => return Err(self.label_error(i, label)),
            };
            if slot.replace(target).is_some() {
                return Err(self.label_error(i, label));
            }
        }

        let affirm = match affirm {
            Some(target) => target,
            None => self.default_target(i)?,
        };
        Ok(vec![
            Edge {
                guard: Guard::Affirmed,
                target: affirm,
            },
            Edge {
                guard: Guard::Denied,
                target: deny.unwrap_or(Target::End),
            },
        ])
    }

    /// `jump_to`, else the loop back-edge, else the sequential successor.
    fn default_target(&self, i: usize) -> Result<Target, ConfigError> {
        if let Some(jump) = &self.flow.steps[i].jump_to {
            return self.jump_target(i, jump);
        }
        if let Some(&head) = self.loop_tails.get(&i) {
            return Ok(Target::Step(head));
        }
        Ok(self.successor(i))
    }

    fn loop_exit(&self, head: usize, body: &[String]) -> Result<Target, ConfigError> {
        if let Some(jump) = &self.flow.steps[head].jump_to {
            return self.jump_target(head, jump);
        }
        if let Some(&outer) = self.loop_tails.get(&head) {
            return Ok(Target::Step(outer));
        }
        let last = body
            .iter()
            .filter_map(|name| self.index.get(name.as_str()).copied())
            .fold(head, usize::max);
        Ok(self.successor(last))
    }

    fn successor(&self, i: usize) -> Target {
        if i + 1 < self.flow.steps.len() {
            Target::Step(i + 1)
        } else {
            Target::End
        }
    }

    fn jump_target(&self, i: usize, target: &str) -> Result<Target, ConfigError> {
        if target == END_STEP {
            return Ok(Target::End);
        }
        if let Some(&j) = self.index.get(target) {
            return Ok(Target::Step(j));
        }
        match self.jump_policy {
            JumpPolicy::Lenient => {
                warn!(
                    flow = %self.flow.id,
                    step = %self.flow.steps[i].name,
                    jump_to = target,
                    "jump_to names an undefined step; ending the flow there instead"
                );
                Ok(Target::End)
            }
            JumpPolicy::Strict => Err(ConfigError::UnresolvedJump {
                flow_id: self.flow.id.clone(),
                step: self.flow.steps[i].name.clone(),
                target: target.to_string(),
            }),
        }
    }

    fn case_target(&self, i: usize, target: &str) -> Result<Target, ConfigError> {
        if target == END_STEP {
            return Ok(Target::End);
        }
        self.index
            .get(target)
            .map(|&j| Target::Step(j))
            .ok_or_else(|| ConfigError::UnresolvedTarget {
                flow_id: self.flow.id.clone(),
                step: self.flow.steps[i].name.clone(),
                target: target.to_string(),
            })
    }

    fn predicate(&self, i: usize, source: &str) -> Result<Predicate, ConfigError> {
        Predicate::parse(source).map_err(|source| ConfigError::InvalidCondition {
            flow_id: self.flow.id.clone(),
            step: self.flow.steps[i].name.clone(),
            source,
        })
    }

    fn label_error(&self, i: usize, label: &str) -> ConfigError {
        ConfigError::InvalidCaseLabel {
            flow_id: self.flow.id.clone(),
            step: self.flow.steps[i].name.clone(),
            label: label.to_string(),
        }
    }

    fn loop_error(&self, i: usize, message: &str) -> ConfigError {
        ConfigError::InvalidLoopBody {
            flow_id: self.flow.id.clone(),
            step: self.flow.steps[i].name.clone(),
            message: message.to_string(),
        }
    }
}
