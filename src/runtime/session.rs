use super::collaborators::{ActionExecutor, Classifier, NluRequest, RenderRequest, Renderer};
use super::executor::{TurnEffects, TurnExecutor};
use super::registry::{FlowRegistry, FlowSet};
use super::snapshot::SessionSnapshot;
use crate::compiler::{StepKind, StepNode};
use crate::config::RuntimeConfig;
use crate::error::{CollaboratorError, FlowStackError, RuntimeError, SnapshotError};
use crate::expression::SlotMap;
use crate::router::{Classification, MessageType, Router, RoutingDecision};
use crate::stack::FlowStack;
use crate::state::{ConversationState, SessionState, StateMachine, StateUpdate, TurnRecord};
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared, read-only context for every session: compiled flows, collaborators and settings.
pub struct Orchestrator {
    registry: Arc<FlowRegistry>,
    classifier: Arc<dyn Classifier>,
    actions: Arc<dyn ActionExecutor>,
    renderer: Arc<dyn Renderer>,
    config: RuntimeConfig,
    router: Router,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<FlowRegistry>,
        classifier: Arc<dyn Classifier>,
        actions: Arc<dyn ActionExecutor>,
        renderer: Arc<dyn Renderer>,
        config: RuntimeConfig,
    ) -> Self {
        let router = Router::new(config.max_digression_depth);
        Self {
            registry,
            classifier,
            actions,
            renderer,
            config,
            router,
        }
    }

    pub fn registry(&self) -> &Arc<FlowRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn router(&self) -> &Router {
        &self.router
    }
}

/// The result of one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// Rendered messages, in order.
    pub responses: Vec<String>,
    pub requests: Vec<RenderRequest>,
    /// `None` if the turn failed before routing.
    pub decision: Option<RoutingDecision>,
    pub state: ConversationState,
    pub waiting_for_slot: Option<String>,
    /// A collaborator failure the turn recovered from.
    pub error: Option<CollaboratorError>,
}

/// Identity of the executing position; a turn that changes it made progress.
/// Progress on the same position is reported by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Progress {
    instance: Option<u64>,
    step: Option<String>,
    depth: usize,
}

impl Progress {
    fn of(stack: &FlowStack) -> Self {
        let top = stack.top();
        Self {
            instance: top.map(|t| t.instance_id()),
            step: top.and_then(|t| t.current_step()).map(str::to_string),
            depth: stack.depth(),
        }
    }
}

/// Where the session stood before the turn.
struct Resting {
    progress: Progress,
    state: ConversationState,
    waiting_for_slot: Option<String>,
}

/// What a failed turn puts back.
struct Checkpoint {
    stack: FlowStack,
    waiting_for_slot: Option<String>,
}

/// One conversation. Turns are processed strictly one at a time through `&mut self`.
pub struct Session {
    id: String,
    machine: StateMachine,
    orchestrator: Arc<Orchestrator>,
}

impl Session {
    pub fn new(id: &str, orchestrator: Arc<Orchestrator>) -> Self {
        let machine = StateMachine::new(orchestrator.config.history_window);
        Self {
            id: id.to_string(),
            machine,
            orchestrator,
        }
    }

    /// Rebuilds a session from a snapshot. The snapshot's state must be consistent.
    pub fn restore(orchestrator: Arc<Orchestrator>, snapshot: SessionSnapshot) -> Result<Self, RuntimeError> {
        let SessionSnapshot { session_id, state } = snapshot;
        let flows = orchestrator.registry.snapshot();
        for frame in state.flow_stack().frames() {
            if !flows.contains(frame.flow_id()) {
                warn!(session = %session_id, flow = %frame.flow_id(), "restored session refers to an unregistered flow");
            }
        }
        let machine = StateMachine::restore(state, orchestrator.config.history_window)
            .map_err(SnapshotError::Invalid)?;
        debug!(session = %session_id, "session restored");
        Ok(Self {
            id: session_id,
            machine,
            orchestrator,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> &SessionState {
        self.machine.state()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            state: self.machine.state().clone(),
        }
    }

    /// Starts `flow_id` without consulting the NLU. The session must have no active flow.
    pub fn start_flow(&mut self, flow_id: &str, slots: SlotMap) -> Result<TurnOutcome, RuntimeError> {
        let flows = self.orchestrator.registry.snapshot();
        if !flows.contains(flow_id) {
            return Err(RuntimeError::UnknownFlow(flow_id.to_string()));
        }
        if let Some(active) = self.machine.state().active_flow() {
            return Err(FlowStackError::NotEmpty {
                active_flow: active.to_string(),
            }
            .into());
        }
        let checkpoint = self.checkpoint();
        let resting = self.resting();
        let mut classification = Classification::new(MessageType::IntentChange).with_command(flow_id);
        classification.slots = slots.into_iter().collect();
        let decision = RoutingDecision::StartFlow {
            flow_id: flow_id.to_string(),
        };

        let result = self
            .machine
            .update(StateUpdate::transition(ConversationState::Understanding))
            .map_err(RuntimeError::from)
            .and_then(|_| self.dispatch(&flows, resting, decision, classification, ""));
        self.recover(result, checkpoint)
    }

    pub fn handle_turn(&mut self, text: &str) -> Result<TurnOutcome, RuntimeError> {
        let flows = self.orchestrator.registry.snapshot();
        let checkpoint = self.checkpoint();
        let result = self.run_turn(&flows, text);
        self.recover(result, checkpoint)
    }

    fn run_turn(&mut self, flows: &FlowSet, text: &str) -> Result<TurnOutcome, RuntimeError> {
        let resting = self.resting();
        self.machine.update(
            StateUpdate::transition(ConversationState::Understanding)
                .incrementing_turn()
                .recording(TurnRecord::user(text)),
        )?;
        debug!(session = %self.id, turn = self.machine.state().turn_count(), "turn started");

        let classification = match self.classify(text) {
            Ok(classification) => classification,
            Err(error) => return self.classification_failed(error),
        };

        let current = current_node(flows, self.machine.state().flow_stack())?;
        let decision = self
            .orchestrator
            .router
            .route(current, &classification, self.machine.state());
        self.dispatch(flows, resting, decision, classification, text)
    }

    fn dispatch(
        &mut self,
        flows: &FlowSet,
        resting: Resting,
        decision: RoutingDecision,
        classification: Classification,
        text: &str,
    ) -> Result<TurnOutcome, RuntimeError> {
        let mut executor = TurnExecutor::new(
            flows,
            self.orchestrator.actions.as_ref(),
            &mut self.machine,
            self.orchestrator.config.max_steps_per_turn,
        );
        executor.execute(&decision, &classification, text)?;
        let effects = executor.finish();
        self.commit(flows, resting, decision, classification, effects)
    }

    fn commit(
        &mut self,
        flows: &FlowSet,
        resting: Resting,
        decision: RoutingDecision,
        classification: Classification,
        effects: TurnEffects,
    ) -> Result<TurnOutcome, RuntimeError> {
        let TurnEffects {
            stack,
            pending_intent,
            requests,
            failure,
            advanced,
        } = effects;

        let progressed = advanced || Progress::of(&stack) != resting.progress;
        let depth = match decision {
            RoutingDecision::Digress { depth } | RoutingDecision::DigressionLimit { depth } => depth,
            _ if progressed => 0,
            _ => self.machine.state().metadata().digression_depth(),
        };

        let (next_state, waiting_for_slot) = match (&failure, &decision) {
            (Some(_), _) => (ConversationState::Error, None),
            (
                None,
                RoutingDecision::Digress { .. } | RoutingDecision::DigressionLimit { .. } | RoutingDecision::Reprompt,
            ) if is_resting(resting.state) => (resting.state, resting.waiting_for_slot),
            (None, _) => resting_position(flows, &stack, pending_intent.as_deref())?,
        };

        let responses: Vec<String> = requests
            .iter()
            .map(|request| self.orchestrator.renderer.render(request))
            .collect();

        let mut update = StateUpdate::new()
            .with_stack(stack)
            .waiting_for(waiting_for_slot.as_deref())
            .with_pending_intent_change(pending_intent.as_deref())
            .with_digression_depth(depth)
            .with_classification(Some(classification));
        if let Some(counter) = counter_for(&decision) {
            update = update.incrementing_counter(counter);
        }
        if failure.is_some() {
            update = update.incrementing_counter("action_failures");
        } else {
            update = update.to(ConversationState::GeneratingResponse);
        }
        self.machine.update(update)?;

        let mut settle = StateUpdate::transition(next_state).with_response(responses.last().map(String::as_str));
        for response in &responses {
            settle = settle.recording(TurnRecord::assistant(response));
        }
        self.machine.update(settle)?;

        debug!(
            session = %self.id,
            state = %next_state,
            waiting_for_slot = waiting_for_slot.as_deref().unwrap_or("-"),
            responses = responses.len(),
            "turn committed"
        );
        Ok(TurnOutcome {
            responses,
            requests,
            decision: Some(decision),
            state: next_state,
            waiting_for_slot,
            error: failure,
        })
    }

    fn classify(&self, text: &str) -> Result<Classification, CollaboratorError> {
        let state = self.machine.state();
        let top = state.flow_stack().top();
        let step = top.and_then(|t| t.current_step());
        let request = NluRequest {
            text,
            flow_id: top.map(|t| t.flow_id()),
            step,
            waiting_for_slot: state.waiting_for_slot(),
            slots: top.map(|t| t.slots()),
            history: state.history(),
        };
        let classification = self.orchestrator.classifier.classify(&request)?;
        debug!(
            message_type = ?classification.message_type,
            confidence = classification.confidence,
            "classified turn"
        );
        Ok(classification)
    }

    fn classification_failed(&mut self, error: CollaboratorError) -> Result<TurnOutcome, RuntimeError> {
        warn!(session = %self.id, %error, "classification failed");
        let state = self.machine.state();
        let top = state.flow_stack().top();
        let request = RenderRequest {
            template: "error".to_string(),
            flow_id: top.map(|t| t.flow_id().to_string()),
            step: top.and_then(|t| t.current_step()).map(str::to_string),
            slots: top.map(|t| t.slots().clone()).unwrap_or_default(),
        };
        let response = self.orchestrator.renderer.render(&request);
        let waiting_for_slot = state.waiting_for_slot().map(str::to_string);

        self.machine.update(
            StateUpdate::transition(ConversationState::Error)
                .with_response(Some(&response))
                .recording(TurnRecord::assistant(&response)),
        )?;
        Ok(TurnOutcome {
            responses: vec![response],
            requests: vec![request],
            decision: None,
            state: ConversationState::Error,
            waiting_for_slot,
            error: Some(error),
        })
    }

    fn resting(&self) -> Resting {
        let state = self.machine.state();
        Resting {
            progress: Progress::of(state.flow_stack()),
            state: state.conversation_state(),
            waiting_for_slot: state.waiting_for_slot().map(str::to_string),
        }
    }

    fn checkpoint(&self) -> Checkpoint {
        let state = self.machine.state();
        Checkpoint {
            stack: state.flow_stack().clone(),
            waiting_for_slot: state.waiting_for_slot().map(str::to_string),
        }
    }

    /// Moves the session into the error state after a failed turn, if the table allows it.
    /// The flow stack and waiting slot go back to where they were before the turn.
    fn recover(
        &mut self,
        result: Result<TurnOutcome, RuntimeError>,
        checkpoint: Checkpoint,
    ) -> Result<TurnOutcome, RuntimeError> {
        if let Err(error) = &result {
            warn!(session = %self.id, %error, "turn failed");
            let Checkpoint {
                stack,
                waiting_for_slot,
            } = checkpoint;
            if let Err(state_error) = self.machine.update(
                StateUpdate::transition(ConversationState::Error)
                    .with_stack(stack)
                    .waiting_for(waiting_for_slot.as_deref()),
            ) {
                warn!(session = %self.id, %state_error, "could not enter the error state");
            }
        }
        result
    }
}

fn is_resting(state: ConversationState) -> bool {
    matches!(
        state,
        ConversationState::Idle
            | ConversationState::WaitingForSlot
            | ConversationState::Confirming
            | ConversationState::Error
    )
}

/// The resting state implied by where the executing flow stopped.
fn resting_position(
    flows: &FlowSet,
    stack: &FlowStack,
    pending_intent: Option<&str>,
) -> Result<(ConversationState, Option<String>), RuntimeError> {
    let kind = current_node(flows, stack)?.map(|node| node.kind());
    let waiting = match kind {
        Some(StepKind::Collect { slot, .. }) => Some(slot.clone()),
        _ => None,
    };
    if pending_intent.is_some() {
        return Ok((ConversationState::Confirming, waiting));
    }
    let state = match kind {
        None if stack.is_empty() => ConversationState::Idle,
        Some(StepKind::Collect { .. }) => ConversationState::WaitingForSlot,
        Some(StepKind::Confirm { .. }) => ConversationState::Confirming,
        _ => {
            warn!(
                flow = stack.top().map(|t| t.flow_id()).unwrap_or("-"),
                "flow stopped on a step that takes no input"
            );
            ConversationState::Error
        }
    };
    Ok((state, waiting))
}

fn current_node<'f>(flows: &'f FlowSet, stack: &FlowStack) -> Result<Option<&'f StepNode>, RuntimeError> {
    let Some(top) = stack.top() else {
        return Ok(None);
    };
    let graph = flows
        .get(top.flow_id())
        .ok_or_else(|| RuntimeError::UnknownFlow(top.flow_id().to_string()))?;
    Ok(top.current_step().and_then(|step| graph.step(step)))
}

fn counter_for(decision: &RoutingDecision) -> Option<&'static str> {
    match decision {
        RoutingDecision::UpdateSlots { .. } => Some("corrections"),
        RoutingDecision::Digress { .. } => Some("digressions"),
        RoutingDecision::DigressionLimit { .. } => Some("digression_limits"),
        RoutingDecision::Reprompt => Some("reprompts"),
        RoutingDecision::Cancel => Some("cancellations"),
        _ => None,
    }
}
