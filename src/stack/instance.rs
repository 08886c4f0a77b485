use crate::expression::{SlotMap, Value};
use serde::{Deserialize, Serialize};

/// Lifecycle of a single flow invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Active,
    Suspended,
    Completed,
    Cancelled,
}

/// One invocation of a flow, with its own slot scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowInstance {
    flow_id: String,
    instance_id: u64,
    state: InstanceState,
    current_step: Option<String>,
    resume_step: Option<String>,
    slots: SlotMap,
}

impl FlowInstance {
    pub(super) fn new(flow_id: &str, instance_id: u64, slots: SlotMap) -> Self {
        Self {
            flow_id: flow_id.to_string(),
            instance_id,
            state: InstanceState::Active,
            current_step: None,
            resume_step: None,
            slots,
        }
    }

    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == InstanceState::Active
    }

    /// The step the instance is positioned on; `None` before entry.
    pub fn current_step(&self) -> Option<&str> {
        self.current_step.as_deref()
    }

    /// Where a suspended caller continues once its callee returns.
    pub fn resume_step(&self) -> Option<&str> {
        self.resume_step.as_deref()
    }

    pub fn slots(&self) -> &SlotMap {
        &self.slots
    }

    pub fn slot(&self, name: &str) -> Option<&Value> {
        self.slots.get(name)
    }

    pub fn set_current_step(&mut self, step: Option<&str>) {
        self.current_step = step.map(str::to_string);
    }

    pub fn set_slot(&mut self, name: &str, value: Value) {
        self.slots.insert(name.to_string(), value);
    }

    pub fn merge_slots<I>(&mut self, updates: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.slots.extend(updates);
    }

    pub(super) fn set_state(&mut self, state: InstanceState) {
        self.state = state;
    }

    pub(super) fn suspend_at_current_step(&mut self) {
        self.resume_step = self.current_step.clone();
        self.state = InstanceState::Suspended;
    }

    pub(super) fn resume(&mut self) {
        self.current_step = self.resume_step.take();
        self.state = InstanceState::Active;
    }
}
