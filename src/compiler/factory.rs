use super::graph::StepKind;
use crate::error::ConfigError;
use crate::expression::Predicate;
use crate::flow::StepDefinition;
use ahash::AHashMap;

/// Master macro to define all step types, their tags, and their registration.
macro_rules! define_step_types {
    ( $( ($variant:ident, $tag:expr) ),* $(,)? ) => {
        /// The closed set of step types the compiler understands.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum StepType {
            $( $variant, )*
        }

        impl StepType {
            /// The canonical `type` tag of this step type.
            pub fn tag(&self) -> &'static str {
                match self {
                    $( StepType::$variant => $tag, )*
                }
            }

            pub fn from_tag(tag: &str) -> Option<Self> {
                match tag {
                    $( $tag => Some(StepType::$variant), )*
                    _ => None,
                }
            }
        }

        pub(super) fn register_default_types(registry: &mut AHashMap<String, StepType>) {
            $( registry.insert($tag.to_string(), StepType::$variant); )*
        }
    };
}

define_step_types! {
    (Collect, "collect"),
    (Action, "action"),
    (Branch, "branch"),
    (Confirm, "confirm"),
    (Say, "say"),
    (While, "while"),
    (Call, "call"),
    (Link, "link"),
}

/// Builds the executable variant for one step definition, checking the fields its type requires.
pub(super) fn build_kind(
    flow_id: &str,
    step: &StepDefinition,
    step_type: StepType,
) -> Result<StepKind, ConfigError> {
    let require = |value: &Option<String>, field: &'static str| {
        value.clone().ok_or_else(|| ConfigError::MissingField {
            flow_id: flow_id.to_string(),
            step: step.name.clone(),
            field,
        })
    };
    let predicate = |source: &str| {
        Predicate::parse(source).map_err(|source| ConfigError::InvalidCondition {
            flow_id: flow_id.to_string(),
            step: step.name.clone(),
            source,
        })
    };

    match step_type {
        StepType::Collect => {
            let slot = require(&step.slot, "slot")?;
            Ok(StepKind::Collect {
                prompt: step
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("ask_{}", slot)),
                rejection: step
                    .input
                    .clone()
                    .unwrap_or_else(|| format!("invalid_{}", slot)),
                validation: step.validation.as_deref().map(predicate).transpose()?,
                ask_before_filling: step.ask_before_filling,
                slot,
            })
        }
        StepType::Action => Ok(StepKind::Action {
            action: require(&step.call, "call")?,
        }),
        StepType::Branch => {
            if step.cases.is_empty() {
                return Err(ConfigError::MissingField {
                    flow_id: flow_id.to_string(),
                    step: step.name.clone(),
                    field: "cases",
                });
            }
            Ok(StepKind::Branch)
        }
        StepType::Confirm => Ok(StepKind::Confirm {
            slot: step.slot.clone(),
            prompt: step
                .message
                .clone()
                .unwrap_or_else(|| format!("confirm_{}", step.name)),
        }),
        StepType::Say => Ok(StepKind::Say {
            message: require(&step.message, "message")?,
        }),
        StepType::While => {
            let condition = predicate(&require(&step.condition, "condition")?)?;
            if step.body.is_empty() {
                return Err(ConfigError::InvalidLoopBody {
                    flow_id: flow_id.to_string(),
                    step: step.name.clone(),
                    message: "the `do` list is empty".to_string(),
                });
            }
            Ok(StepKind::While {
                condition,
                body: step.body.clone(),
            })
        }
        StepType::Call => Ok(StepKind::Call {
            flow: require(&step.call, "call")?,
        }),
        StepType::Link => Ok(StepKind::Link {
            flow: require(&step.call, "call")?,
        }),
    }
}
