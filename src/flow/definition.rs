use serde::{Deserialize, Serialize};

/// Name of the terminal marker. `jump_to` and case targets may name it to end a flow.
pub const END_STEP: &str = "END";

/// The complete, canonical definition of a conversational flow, ready for compilation.
/// This is the target structure for any custom data model conversion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowDefinition {
    pub id: String,
    pub description: String,
    pub steps: Vec<StepDefinition>,
}

impl FlowDefinition {
    pub fn new(id: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            steps: Vec::new(),
        }
    }

    pub fn with_step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }
}

/// Defines a single step of a flow. Which fields are required depends on `step_type`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub step_type: String,
    /// Target slot for collect steps; where confirm steps store the answer.
    pub slot: Option<String>,
    /// Action name for action steps; target flow id for call and link steps.
    pub call: Option<String>,
    /// Template key rendered when the step is entered.
    pub message: Option<String>,
    /// Template key rendered when a collected value is rejected.
    pub input: Option<String>,
    pub cases: Vec<CaseDefinition>,
    pub condition: Option<String>,
    pub body: Vec<String>,
    pub jump_to: Option<String>,
    /// Condition the collected value must satisfy.
    pub validation: Option<String>,
    /// Re-ask a collect step even if its slot already holds a value.
    pub ask_before_filling: bool,
}

/// One entry of a branch or confirm step's `cases` mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseDefinition {
    pub label: String,
    pub target: String,
}

impl StepDefinition {
    pub fn new(name: &str, step_type: &str) -> Self {
        Self {
            name: name.to_string(),
            step_type: step_type.to_string(),
            ..Default::default()
        }
    }

    pub fn collect(name: &str, slot: &str) -> Self {
        Self::new(name, "collect").with_slot(slot)
    }

    pub fn action(name: &str, call: &str) -> Self {
        Self::new(name, "action").with_call(call)
    }

    pub fn say(name: &str, message: &str) -> Self {
        Self::new(name, "say").with_message(message)
    }

    pub fn branch(name: &str) -> Self {
        Self::new(name, "branch")
    }

    pub fn confirm(name: &str) -> Self {
        Self::new(name, "confirm")
    }

    pub fn while_loop(name: &str, condition: &str, body: &[&str]) -> Self {
        let mut step = Self::new(name, "while").with_condition(condition);
        step.body = body.iter().map(|s| s.to_string()).collect();
        step
    }

    pub fn call_flow(name: &str, flow_id: &str) -> Self {
        Self::new(name, "call").with_call(flow_id)
    }

    pub fn link_flow(name: &str, flow_id: &str) -> Self {
        Self::new(name, "link").with_call(flow_id)
    }

    pub fn with_slot(mut self, slot: &str) -> Self {
        self.slot = Some(slot.to_string());
        self
    }

    pub fn with_call(mut self, call: &str) -> Self {
        self.call = Some(call.to_string());
        self
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    pub fn with_input(mut self, input: &str) -> Self {
        self.input = Some(input.to_string());
        self
    }

    pub fn with_case(mut self, label: &str, target: &str) -> Self {
        self.cases.push(CaseDefinition {
            label: label.to_string(),
            target: target.to_string(),
        });
        self
    }

    pub fn with_condition(mut self, condition: &str) -> Self {
        self.condition = Some(condition.to_string());
        self
    }

    pub fn with_jump_to(mut self, target: &str) -> Self {
        self.jump_to = Some(target.to_string());
        self
    }

    pub fn with_validation(mut self, validation: &str) -> Self {
        self.validation = Some(validation.to_string());
        self
    }

    pub fn asking_before_filling(mut self) -> Self {
        self.ask_before_filling = true;
        self
    }
}
