//! The per-session stack of flow invocations.
//!
//! The last frame is the executing flow. `call` stacks a sub-flow above a
//! suspended caller that resumes where it left off; `link` hands control to
//! another flow without keeping a return point.

use crate::error::FlowStackError;
use crate::expression::SlotMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

mod instance;

pub use instance::{FlowInstance, InstanceState};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowStack {
    frames: Vec<FlowInstance>,
    next_instance_id: u64,
}

impl FlowStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn top(&self) -> Option<&FlowInstance> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut FlowInstance> {
        self.frames.last_mut()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// All frames, bottom first.
    pub fn frames(&self) -> &[FlowInstance] {
        &self.frames
    }

    /// Starts a root flow. The stack must be empty.
    pub fn start(&mut self, flow_id: &str, initial_slots: SlotMap) -> Result<&FlowInstance, FlowStackError> {
        if let Some(top) = self.top() {
            return Err(FlowStackError::NotEmpty {
                active_flow: top.flow_id().to_string(),
            });
        }
        Ok(self.push(flow_id, initial_slots))
    }

    /// Suspends the executing flow at its current step and pushes `flow_id` above it.
    pub fn call(&mut self, flow_id: &str) -> Result<&FlowInstance, FlowStackError> {
        self.active_top_mut()?.suspend_at_current_step();
        Ok(self.push(flow_id, SlotMap::new()))
    }

    /// Replaces the executing flow with `flow_id`. The replaced instance is discarded.
    pub fn link(&mut self, flow_id: &str) -> Result<&FlowInstance, FlowStackError> {
        self.active_top_mut()?;
        if let Some(replaced) = self.frames.pop() {
            debug!(from = %replaced.flow_id(), to = flow_id, "linking flow");
        }
        Ok(self.push(flow_id, SlotMap::new()))
    }

    /// Marks the executing flow as completed. It stays on the stack until
    /// [`FlowStack::return_from_call`] or [`FlowStack::finish`] pops it.
    pub fn complete_top(&mut self) -> Result<(), FlowStackError> {
        self.active_top_mut()?.set_state(InstanceState::Completed);
        Ok(())
    }

    /// Pops a completed callee and resumes its caller at the recorded step.
    pub fn return_from_call(&mut self) -> Result<FlowInstance, FlowStackError> {
        let top = self.completed_top()?;
        if self.frames.len() < 2 {
            return Err(FlowStackError::NoCallerFrame {
                flow_id: top.flow_id().to_string(),
            });
        }

        let Some(finished) = self.frames.pop() else {
            return Err(FlowStackError::Empty);
        };
        if let Some(caller) = self.frames.last_mut() {
            caller.resume();
            debug!(
                callee = %finished.flow_id(),
                caller = %caller.flow_id(),
                step = caller.current_step().unwrap_or("-"),
                "returned from call"
            );
        }
        Ok(finished)
    }

    /// Pops a completed root flow, leaving the stack empty.
    pub fn finish(&mut self) -> Result<FlowInstance, FlowStackError> {
        let top = self.completed_top()?;
        if self.frames.len() > 1 {
            return Err(FlowStackError::CallerPending {
                flow_id: top.flow_id().to_string(),
            });
        }
        self.frames.pop().ok_or(FlowStackError::Empty)
    }

    /// Empties the stack regardless of depth. Returns the removed instances,
    /// top first, each marked cancelled.
    pub fn cancel(&mut self) -> Vec<FlowInstance> {
        let cancelled: Vec<FlowInstance> = self
            .frames
            .drain(..)
            .rev()
            .map(|mut instance| {
                instance.set_state(InstanceState::Cancelled);
                instance
            })
            .collect();
        if !cancelled.is_empty() {
            debug!(count = cancelled.len(), "cancelled flow stack");
        }
        cancelled
    }

    /// Checks that only the top may be active and every frame below it is suspended.
    pub fn check_invariants(&self) -> Result<(), FlowStackError> {
        let Some((top, below)) = self.frames.split_last() else {
            return Ok(());
        };
        if let Some(frame) = below.iter().find(|f| f.state() != InstanceState::Suspended) {
            return Err(FlowStackError::Inconsistent(format!(
                "frame '{}' below the top is {:?}, expected suspended",
                frame.flow_id(),
                frame.state()
            )));
        }
        if top.state() == InstanceState::Cancelled {
            return Err(FlowStackError::Inconsistent(format!(
                "top frame '{}' is cancelled",
                top.flow_id()
            )));
        }
        Ok(())
    }

    fn push(&mut self, flow_id: &str, slots: SlotMap) -> &FlowInstance {
        let instance = FlowInstance::new(flow_id, self.next_instance_id, slots);
        self.next_instance_id += 1;
        debug!(flow = flow_id, instance = instance.instance_id(), depth = self.frames.len() + 1, "pushed flow");
        self.frames.push(instance);
        &self.frames[self.frames.len() - 1]
    }

    fn active_top_mut(&mut self) -> Result<&mut FlowInstance, FlowStackError> {
        let top = self.frames.last_mut().ok_or(FlowStackError::Empty)?;
        if !top.is_active() {
            return Err(FlowStackError::NotActive {
                flow_id: top.flow_id().to_string(),
            });
        }
        Ok(top)
    }

    fn completed_top(&self) -> Result<&FlowInstance, FlowStackError> {
        let top = self.frames.last().ok_or(FlowStackError::Empty)?;
        if top.state() != InstanceState::Completed {
            return Err(FlowStackError::NotCompleted {
                flow_id: top.flow_id().to_string(),
            });
        }
        Ok(top)
    }
}
