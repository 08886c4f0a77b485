use super::collaborators::{ActionExecutor, RenderRequest};
use super::registry::FlowSet;
use crate::compiler::{StepGraph, StepKind, StepNode, Target};
use crate::error::{CollaboratorError, EvaluationError, RuntimeError};
use crate::expression::{Predicate, SlotMap, Value};
use crate::router::{Classification, RoutingDecision};
use crate::stack::FlowStack;
use crate::state::{ConversationState, StateMachine, StateUpdate};
use tracing::{debug, info, warn};

/// Where the advance loop stands in the executing flow.
enum Cursor {
    /// About to run whatever the edge points at.
    Enter(Target),
    /// Done with the named step; its outgoing edges pick what comes next.
    Leave(String),
}

/// What a turn produced, before it is committed.
pub(super) struct TurnEffects {
    pub stack: FlowStack,
    pub pending_intent: Option<String>,
    pub requests: Vec<RenderRequest>,
    pub failure: Option<CollaboratorError>,
    /// A slot was filled, an action ran or an edge was followed.
    pub advanced: bool,
}

/// Carries out one routing decision against a working copy of the flow stack.
///
/// The only state change made along the way is the move into `executing_action`
/// (or `error` when an action fails); the stack and everything else is committed
/// by the caller.
pub(super) struct TurnExecutor<'a> {
    flows: &'a FlowSet,
    actions: &'a dyn ActionExecutor,
    machine: &'a mut StateMachine,
    max_steps: usize,
    stack: FlowStack,
    pending_intent: Option<String>,
    requests: Vec<RenderRequest>,
    failure: Option<CollaboratorError>,
    advanced: bool,
}

impl<'a> TurnExecutor<'a> {
    pub(super) fn new(
        flows: &'a FlowSet,
        actions: &'a dyn ActionExecutor,
        machine: &'a mut StateMachine,
        max_steps: usize,
    ) -> Self {
        let stack = machine.state().flow_stack().clone();
        let pending_intent = machine
            .state()
            .metadata()
            .pending_intent_change()
            .map(str::to_string);
        Self {
            flows,
            actions,
            machine,
            max_steps,
            stack,
            pending_intent,
            requests: Vec::new(),
            failure: None,
            advanced: false,
        }
    }

    pub(super) fn finish(self) -> TurnEffects {
        TurnEffects {
            stack: self.stack,
            pending_intent: self.pending_intent,
            requests: self.requests,
            failure: self.failure,
            advanced: self.advanced,
        }
    }

    pub(super) fn execute(
        &mut self,
        decision: &RoutingDecision,
        classification: &Classification,
        text: &str,
    ) -> Result<(), RuntimeError> {
        match decision {
            RoutingDecision::Continue => self.continue_step(classification, text),
            RoutingDecision::UpdateSlots { slots } => self.update_slots(slots),
            RoutingDecision::ResolveConfirmation { affirmed } => self.resolve_confirmation(*affirmed),
            RoutingDecision::ResolveIntentChange { accepted } => self.resolve_intent_change(*accepted),
            RoutingDecision::Reprompt => {
                self.reprompt()?;
                Ok(())
            }
            RoutingDecision::Digress { .. } => {
                self.render("digression");
                self.prompt_again()?;
                Ok(())
            }
            RoutingDecision::DigressionLimit { depth } => {
                info!(depth, "digression limit reached");
                self.render("digression_limit");
                self.prompt_again()?;
                Ok(())
            }
            RoutingDecision::ConfirmIntentChange { flow_id } => {
                if self.flows.contains(flow_id) {
                    self.pending_intent = Some(flow_id.clone());
                    self.render_with("confirm_intent_change", "target_flow", flow_id.as_str().into());
                } else {
                    warn!(flow = %flow_id, "intent change names an unknown flow");
                    self.render("fallback");
                }
                Ok(())
            }
            RoutingDecision::StartFlow { flow_id } => {
                let slots = classification.slots.iter().cloned().collect();
                self.start_flow(flow_id, slots)
            }
            RoutingDecision::Cancel => {
                let cancelled = self.stack.cancel();
                self.pending_intent = None;
                info!(flows = cancelled.len(), "conversation cancelled");
                self.render("cancelled");
                Ok(())
            }
        }
    }

    fn continue_step(&mut self, classification: &Classification, text: &str) -> Result<(), RuntimeError> {
        let Some((graph, step)) = self.position()? else {
            self.render("fallback");
            return Ok(());
        };
        let Some(step) = step else {
            return self.advance(Cursor::Enter(graph.entry().target));
        };
        let node = graph.node(step).ok_or_else(|| missing_step(graph, step))?;

        match node.kind() {
            StepKind::Collect { slot, .. } => {
                let value = match classification.slot(slot) {
                    Some(value) => {
                        let extras = classification.slots.iter().filter(|(n, _)| n != slot).cloned();
                        let extras = self.checked_values(graph, extras)?;
                        self.merge_into_top(extras);
                        value.clone()
                    }
                    None if classification.slots.is_empty() => Value::infer(text),
                    // Values for other slots are kept under their own names.
                    None => {
                        let others = self.checked_values(graph, classification.slots.iter().cloned())?;
                        self.merge_into_top(others);
                        self.prompt_again()?;
                        return Ok(());
                    }
                };
                if self.accept_value(node, value)? {
                    self.advance(Cursor::Leave(node.name().to_string()))?;
                }
                Ok(())
            }
            StepKind::Confirm { prompt, .. } => {
                let values = self.checked_values(graph, classification.slots.iter().cloned())?;
                self.merge_into_top(values);
                self.render(prompt);
                Ok(())
            }
            // A failed action is retried on the next turn.
            StepKind::Action { .. } => self.advance(Cursor::Enter(Target::Step(step))),
            _ => self.advance(Cursor::Leave(node.name().to_string())),
        }
    }

    fn update_slots(&mut self, slots: &[(String, Value)]) -> Result<(), RuntimeError> {
        let Some((graph, step)) = self.position()? else {
            self.merge_into_top(slots.iter().cloned());
            self.reprompt()?;
            return Ok(());
        };
        let node = match step {
            Some(step) => Some(graph.node(step).ok_or_else(|| missing_step(graph, step))?),
            None => None,
        };

        let solicited = node.and_then(|node| match node.kind() {
            StepKind::Collect { slot, .. } => slots.iter().find(|(n, _)| n == slot),
            _ => None,
        });
        let others = slots
            .iter()
            .filter(|(n, _)| solicited.is_none_or(|(solicited_name, _)| solicited_name != n))
            .cloned();
        let others = self.checked_values(graph, others)?;
        self.merge_into_top(others);

        match (node, solicited) {
            (Some(node), Some((_, value))) => {
                if self.accept_value(node, value.clone())? {
                    self.advance(Cursor::Leave(node.name().to_string()))?;
                }
            }
            (Some(_), None) => {
                self.prompt_again()?;
            }
            (None, _) => {
                self.reprompt()?;
            }
        }
        Ok(())
    }

    fn resolve_confirmation(&mut self, affirmed: bool) -> Result<(), RuntimeError> {
        let Some((graph, Some(step))) = self.position()? else {
            return self.reprompt().map(|_| ());
        };
        let node = graph.node(step).ok_or_else(|| missing_step(graph, step))?;
        let StepKind::Confirm { slot, .. } = node.kind() else {
            return self.reprompt().map(|_| ());
        };

        if let Some(slot) = slot {
            if let Some(top) = self.stack.top_mut() {
                top.set_slot(slot, Value::Bool(affirmed));
            }
        }
        let target = graph
            .confirm_target(node.name(), affirmed)
            .ok_or_else(|| RuntimeError::NoOutgoingEdge {
                flow_id: graph.flow_id().to_string(),
                step: node.name().to_string(),
            })?;
        debug!(step = %node.name(), affirmed, "confirmation resolved");
        self.advance(Cursor::Enter(target))
    }

    fn resolve_intent_change(&mut self, accepted: bool) -> Result<(), RuntimeError> {
        let Some(flow_id) = self.pending_intent.take() else {
            return self.reprompt().map(|_| ());
        };
        if !accepted {
            debug!(flow = %flow_id, "intent change declined");
            self.prompt_again()?;
            return Ok(());
        }
        if self.stack.is_empty() {
            return self.start_flow(&flow_id, SlotMap::new());
        }

        let graph = self.graph(&flow_id)?;
        self.stack.link(&flow_id)?;
        info!(flow = %flow_id, "switched flow");
        self.advance(Cursor::Enter(graph.entry().target))
    }

    fn start_flow(&mut self, flow_id: &str, slots: SlotMap) -> Result<(), RuntimeError> {
        let Some(graph) = self.flows.get(flow_id) else {
            warn!(flow = flow_id, "cannot start unknown flow");
            self.render("fallback");
            return Ok(());
        };
        self.stack.start(flow_id, slots)?;
        info!(flow = flow_id, "started flow");
        self.advance(Cursor::Enter(graph.entry().target))
    }

    /// Follows edges from `cursor`, running steps that need no input, until the
    /// flow waits for the user or the stack empties.
    fn advance(&mut self, mut cursor: Cursor) -> Result<(), RuntimeError> {
        let mut executed = 0usize;
        loop {
            let Some(top) = self.stack.top() else {
                return Ok(());
            };
            let flow_id = top.flow_id().to_string();
            let graph = self.graph(&flow_id)?;

            cursor = match cursor {
                Cursor::Leave(step) => {
                    self.advanced = true;
                    let target = graph.next_target(&step, top.slots())?.ok_or_else(|| {
                        RuntimeError::NoOutgoingEdge {
                            flow_id: flow_id.clone(),
                            step: step.clone(),
                        }
                    })?;
                    Cursor::Enter(target)
                }
                Cursor::Enter(Target::End) => {
                    self.stack.complete_top()?;
                    if self.stack.depth() < 2 {
                        let finished = self.stack.finish()?;
                        info!(flow = %finished.flow_id(), "flow completed");
                        return Ok(());
                    }
                    self.stack.return_from_call()?;
                    match self.stack.top() {
                        Some(caller) => match caller.current_step() {
                            Some(step) => Cursor::Leave(step.to_string()),
                            None => Cursor::Enter(self.graph(caller.flow_id())?.entry().target),
                        },
                        None => return Ok(()),
                    }
                }
                Cursor::Enter(Target::Step(index)) => {
                    executed += 1;
                    if executed > self.max_steps {
                        return Err(RuntimeError::StepLimit {
                            flow_id,
                            limit: self.max_steps,
                        });
                    }
                    let node = graph.node(index).ok_or_else(|| RuntimeError::MissingStep {
                        flow_id: flow_id.clone(),
                        step: index.to_string(),
                    })?;
                    match self.enter(node)? {
                        Some(next) => next,
                        None => return Ok(()),
                    }
                }
            };
        }
    }

    /// Runs one step. Returns the next cursor, or `None` if the turn stops here.
    fn enter(&mut self, node: &'a StepNode) -> Result<Option<Cursor>, RuntimeError> {
        let name = node.name();
        if let Some(top) = self.stack.top_mut() {
            top.set_current_step(Some(name));
        }
        let leave = Some(Cursor::Leave(name.to_string()));

        match node.kind() {
            StepKind::Collect {
                slot,
                prompt,
                ask_before_filling,
                ..
            } => {
                let filled = self.stack.top().is_some_and(|top| top.slot(slot).is_some());
                if filled && !ask_before_filling {
                    debug!(step = name, slot = %slot, "slot already filled; skipping");
                    return Ok(leave);
                }
                self.render(prompt);
                Ok(None)
            }
            StepKind::Confirm { prompt, .. } => {
                self.render(prompt);
                Ok(None)
            }
            StepKind::Say { message } => {
                self.render(message);
                Ok(leave)
            }
            StepKind::Action { action } => Ok(if self.run_action(action)? { leave } else { None }),
            StepKind::Branch | StepKind::While { .. } => Ok(leave),
            StepKind::Call { flow } => {
                let callee = self.graph(flow)?;
                self.stack.call(flow)?;
                Ok(Some(Cursor::Enter(callee.entry().target)))
            }
            StepKind::Link { flow } => {
                let next = self.graph(flow)?;
                self.stack.link(flow)?;
                Ok(Some(Cursor::Enter(next.entry().target)))
            }
        }
    }

    /// Returns `false` if the action failed; the session is then in the error state.
    fn run_action(&mut self, action: &str) -> Result<bool, RuntimeError> {
        // The working stack is committed with the rest of the turn.
        self.machine.update(
            StateUpdate::transition(ConversationState::ExecutingAction).waiting_for(None),
        )?;
        let slots = self.stack.top().map(|top| top.slots().clone()).unwrap_or_default();

        match self.actions.execute(action, &slots) {
            Ok(result) => {
                debug!(action, updates = result.slots.len(), "action executed");
                self.merge_into_top(result.slots);
                self.advanced = true;
                Ok(true)
            }
            Err(error) => {
                warn!(action, %error, "action failed");
                self.machine.update(StateUpdate::transition(ConversationState::Error))?;
                self.render("action_failed");
                self.failure = Some(error);
                Ok(false)
            }
        }
    }

    /// Validates and stores a value for the collect step `node`. A rejected value
    /// is answered with the step's rejection template and prompt.
    fn accept_value(&mut self, node: &StepNode, value: Value) -> Result<bool, RuntimeError> {
        let StepKind::Collect {
            slot,
            prompt,
            rejection,
            validation,
            ..
        } = node.kind()
        else {
            return Ok(false);
        };

        if !self.passes(validation.as_ref(), slot, &value)? {
            debug!(step = %node.name(), slot = %slot, %value, "value rejected");
            self.render(rejection);
            self.render(prompt);
            return Ok(false);
        }
        if let Some(top) = self.stack.top_mut() {
            top.set_slot(slot, value);
        }
        self.advanced = true;
        Ok(true)
    }

    /// Keeps the values the collect step owning each slot would accept. Each
    /// rejected value is answered with that step's rejection template.
    fn checked_values<I>(&mut self, graph: &StepGraph, values: I) -> Result<Vec<(String, Value)>, RuntimeError>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut accepted = Vec::new();
        for (name, value) in values {
            let owner = graph.nodes().iter().find_map(|node| match node.kind() {
                StepKind::Collect {
                    slot,
                    rejection,
                    validation,
                    ..
                } if *slot == name => Some((rejection, validation)),
                _ => None,
            });
            if let Some((rejection, validation)) = owner {
                if !self.passes(validation.as_ref(), &name, &value)? {
                    debug!(slot = %name, %value, "corrected value rejected");
                    self.render(rejection);
                    continue;
                }
            }
            accepted.push((name, value));
        }
        Ok(accepted)
    }

    fn passes(&self, validation: Option<&Predicate>, slot: &str, value: &Value) -> Result<bool, RuntimeError> {
        let Some(rule) = validation else {
            return Ok(true);
        };
        let mut candidate = self.stack.top().map(|top| top.slots().clone()).unwrap_or_default();
        candidate.insert(slot.to_string(), value.clone());
        match rule.evaluate(&candidate) {
            Ok(passed) => Ok(passed),
            // A value that cannot be compared does not satisfy the rule.
            Err(EvaluationError::Incomparable { .. }) => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    /// Repeats the pending question: the intent-change confirmation if one is open,
    /// else the current step's prompt, else the fallback.
    fn reprompt(&mut self) -> Result<bool, RuntimeError> {
        if let Some(flow_id) = self.pending_intent.clone() {
            self.render_with("confirm_intent_change", "target_flow", flow_id.into());
            return Ok(true);
        }
        if self.prompt_again()? {
            return Ok(true);
        }
        self.render("fallback");
        Ok(false)
    }

    fn prompt_again(&mut self) -> Result<bool, RuntimeError> {
        let Some((graph, Some(step))) = self.position()? else {
            return Ok(false);
        };
        match graph.node(step).and_then(|node| node.kind().prompt()) {
            Some(prompt) => {
                self.render(prompt);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// The graph of the executing flow and the index of its current step.
    fn position(&self) -> Result<Option<(&'a StepGraph, Option<usize>)>, RuntimeError> {
        let Some(top) = self.stack.top() else {
            return Ok(None);
        };
        let graph = self.graph(top.flow_id())?;
        let step = match top.current_step() {
            Some(name) => Some(graph.index_of(name).ok_or_else(|| RuntimeError::MissingStep {
                flow_id: top.flow_id().to_string(),
                step: name.to_string(),
            })?),
            None => None,
        };
        Ok(Some((graph, step)))
    }

    fn graph(&self, flow_id: &str) -> Result<&'a StepGraph, RuntimeError> {
        self.flows
            .get(flow_id)
            .ok_or_else(|| RuntimeError::UnknownFlow(flow_id.to_string()))
    }

    fn merge_into_top<I>(&mut self, slots: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        if let Some(top) = self.stack.top_mut() {
            top.merge_slots(slots);
        }
    }

    fn render(&mut self, template: &str) {
        let request = self.request(template);
        self.requests.push(request);
    }

    fn render_with(&mut self, template: &str, key: &str, value: Value) {
        let mut request = self.request(template);
        request.slots.insert(key.to_string(), value);
        self.requests.push(request);
    }

    fn request(&self, template: &str) -> RenderRequest {
        let top = self.stack.top();
        RenderRequest {
            template: template.to_string(),
            flow_id: top.map(|t| t.flow_id().to_string()),
            step: top.and_then(|t| t.current_step()).map(str::to_string),
            slots: top.map(|t| t.slots().clone()).unwrap_or_default(),
        }
    }
}

fn missing_step(graph: &StepGraph, index: usize) -> RuntimeError {
    RuntimeError::MissingStep {
        flow_id: graph.flow_id().to_string(),
        step: index.to_string(),
    }
}
