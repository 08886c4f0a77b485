use crate::error::CollaboratorError;
use crate::expression::{SlotMap, Value};
use crate::router::Classification;
use crate::state::TurnRecord;
use ahash::AHashMap;
use serde::Serialize;
use tracing::debug;

/// Everything the NLU gets to see about a turn.
#[derive(Debug, Clone, Copy)]
pub struct NluRequest<'a> {
    pub text: &'a str,
    pub flow_id: Option<&'a str>,
    pub step: Option<&'a str>,
    pub waiting_for_slot: Option<&'a str>,
    pub slots: Option<&'a SlotMap>,
    pub history: &'a [TurnRecord],
}

/// Turns raw user text into a [`Classification`].
pub trait Classifier: Send + Sync {
    fn classify(&self, request: &NluRequest<'_>) -> Result<Classification, CollaboratorError>;
}

/// Slot values produced by an action, merged into the calling flow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionResult {
    pub slots: Vec<(String, Value)>,
}

impl ActionResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_slot(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.slots.push((name.to_string(), value.into()));
        self
    }
}

/// Runs the external side effects named by action steps.
pub trait ActionExecutor: Send + Sync {
    fn execute(&self, action: &str, slots: &SlotMap) -> Result<ActionResult, CollaboratorError>;
}

/// A message the runtime wants shown to the user, by template key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderRequest {
    pub template: String,
    pub flow_id: Option<String>,
    pub step: Option<String>,
    pub slots: SlotMap,
}

pub trait Renderer: Send + Sync {
    /// Must not fail; unknown templates fall back to a generic message.
    fn render(&self, request: &RenderRequest) -> String;
}

/// Looks templates up by key and fills `{slot}` placeholders from the request's slots.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    templates: AHashMap<String, String>,
    fallback: String,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self {
            templates: AHashMap::new(),
            fallback: "Sorry, I didn't get that.".to_string(),
        }
    }

    pub fn with_template(mut self, key: &str, text: &str) -> Self {
        self.templates.insert(key.to_string(), text.to_string());
        self
    }

    pub fn with_templates<I, K, V>(mut self, templates: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.templates
            .extend(templates.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_fallback(mut self, text: &str) -> Self {
        self.fallback = text.to_string();
        self
    }

    fn interpolate(template: &str, slots: &SlotMap) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    let name = after[..close].trim();
                    match slots.get(name) {
                        Some(value) => out.push_str(&value.to_string()),
                        None => out.push_str(&rest[open..open + close + 2]),
                    }
                    rest = &after[close + 1..];
                }
                None => {
                    out.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

impl Renderer for TemplateRenderer {
    fn render(&self, request: &RenderRequest) -> String {
        match self.templates.get(&request.template) {
            Some(template) => Self::interpolate(template, &request.slots),
            None => {
                debug!(template = %request.template, "no template registered; using fallback");
                self.fallback.clone()
            }
        }
    }
}
