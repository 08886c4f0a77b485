use crate::compiler::JumpPolicy;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Tunables of the orchestrator. Every field has a default, so a partial JSON
/// document is enough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Consecutive digressions allowed before the limit handler takes over.
    pub max_digression_depth: u32,
    pub jump_policy: JumpPolicy,
    /// Guards against flows that loop without ever waiting for input.
    pub max_steps_per_turn: usize,
    /// Number of recent turns kept in the session history.
    pub history_window: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_digression_depth: 3,
            jump_policy: JumpPolicy::Lenient,
            max_steps_per_turn: 64,
            history_window: 10,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::InvalidSettings(e.to_string()))?;
        if config.max_steps_per_turn == 0 {
            return Err(ConfigError::InvalidSettings(
                "max_steps_per_turn must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn with_max_digression_depth(mut self, depth: u32) -> Self {
        self.max_digression_depth = depth;
        self
    }

    pub fn with_jump_policy(mut self, jump_policy: JumpPolicy) -> Self {
        self.jump_policy = jump_policy;
        self
    }

    pub fn with_max_steps_per_turn(mut self, steps: usize) -> Self {
        self.max_steps_per_turn = steps;
        self
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }
}
