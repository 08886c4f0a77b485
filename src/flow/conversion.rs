use super::definition::FlowDefinition;
use crate::error::FlowConversionError;

/// A trait for custom data models that can be converted into taiwa `FlowDefinition`s.
///
/// Flow loading is format-agnostic: implement this on your own configuration
/// structs to translate them into the canonical definitions the compiler consumes.
///
/// # Example
///
/// ```rust,no_run
/// use taiwa::prelude::*;
///
/// struct MyStep { name: String, kind: String, slot: Option<String> }
/// struct MyFlow { id: String, steps: Vec<MyStep> }
/// struct MyBot { flows: Vec<MyFlow> }
///
/// impl IntoFlows for MyBot {
///     fn into_flows(self) -> std::result::Result<Vec<FlowDefinition>, FlowConversionError> {
///         self.flows
///             .into_iter()
///             .map(|flow| {
///                 let mut definition = FlowDefinition::new(&flow.id, "");
///                 for step in flow.steps {
///                     let mut converted = StepDefinition::new(&step.name, &step.kind);
///                     converted.slot = step.slot;
///                     definition = definition.with_step(converted);
///                 }
///                 Ok(definition)
///             })
///             .collect()
///     }
/// }
/// ```
pub trait IntoFlows {
    /// Consumes the object and converts it into compiler-ready flow definitions.
    fn into_flows(self) -> Result<Vec<FlowDefinition>, FlowConversionError>;
}

impl IntoFlows for Vec<FlowDefinition> {
    fn into_flows(self) -> Result<Vec<FlowDefinition>, FlowConversionError> {
        Ok(self)
    }
}
