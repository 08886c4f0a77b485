//! Common test utilities: flow fixtures and scripted collaborators.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use taiwa::prelude::*;

/// Collects a recipient and an amount, confirms, then sends the money.
///
/// `ask_recipient -> ask_amount -> confirm_transfer -(yes)-> send -> done`
///                                                   `-(no)-> aborted -> END`
#[allow(dead_code)]
pub fn transfer_flow() -> FlowDefinition {
    FlowDefinition::new("transfer", "Send money to someone")
        .with_step(StepDefinition::collect("ask_recipient", "recipient"))
        .with_step(StepDefinition::collect("ask_amount", "amount").with_validation("amount > 0"))
        .with_step(
            StepDefinition::confirm("confirm_transfer")
                .with_slot("confirmed")
                .with_message("confirm_transfer")
                .with_case("yes", "send")
                .with_case("no", "aborted"),
        )
        .with_step(StepDefinition::action("send", "send_money").with_jump_to("done"))
        .with_step(StepDefinition::say("aborted", "transfer_aborted").with_jump_to("END"))
        .with_step(StepDefinition::say("done", "transfer_done"))
}

/// Fetches and reports the balance without asking anything.
#[allow(dead_code)]
pub fn check_balance_flow() -> FlowDefinition {
    FlowDefinition::new("check_balance", "Report the account balance")
        .with_step(StepDefinition::action("fetch", "fetch_balance"))
        .with_step(StepDefinition::say("report", "balance_report"))
}

/// Sub-flow that asks for a PIN and verifies it.
#[allow(dead_code)]
pub fn verify_identity_flow() -> FlowDefinition {
    FlowDefinition::new("verify_identity", "Ask for and verify the PIN")
        .with_step(StepDefinition::collect("ask_pin", "pin"))
        .with_step(StepDefinition::action("check_pin", "verify_pin"))
}

/// Calls `verify_identity`, then collects the payee.
#[allow(dead_code)]
pub fn pay_bill_flow() -> FlowDefinition {
    FlowDefinition::new("pay_bill", "Pay a bill after verifying identity")
        .with_step(StepDefinition::call_flow("verify", "verify_identity"))
        .with_step(StepDefinition::collect("ask_payee", "payee"))
        .with_step(StepDefinition::say("paid", "bill_paid"))
}

/// Says something and hands over to `transfer` for good.
#[allow(dead_code)]
pub fn upgrade_flow() -> FlowDefinition {
    FlowDefinition::new("upgrade", "Introduce and hand over to a transfer")
        .with_step(StepDefinition::say("intro", "upgrade_intro"))
        .with_step(StepDefinition::link_flow("handoff", "transfer"))
}

/// Bumps `count` until it reaches 3.
#[allow(dead_code)]
pub fn counter_flow() -> FlowDefinition {
    FlowDefinition::new("counter", "Count to three")
        .with_step(StepDefinition::while_loop("loop", "count < 3", &["bump"]))
        .with_step(StepDefinition::action("bump", "increment"))
        .with_step(StepDefinition::say("finished", "counted"))
}

/// `outer` calls `middle`, which calls `inner`, which waits for input.
#[allow(dead_code)]
pub fn nested_flows() -> Vec<FlowDefinition> {
    vec![
        FlowDefinition::new("outer", "")
            .with_step(StepDefinition::call_flow("go_middle", "middle"))
            .with_step(StepDefinition::say("outer_done", "outer_done")),
        FlowDefinition::new("middle", "")
            .with_step(StepDefinition::call_flow("go_inner", "inner"))
            .with_step(StepDefinition::say("middle_done", "middle_done")),
        FlowDefinition::new("inner", "").with_step(StepDefinition::collect("ask_value", "value")),
    ]
}

#[allow(dead_code)]
pub fn banking_flows() -> Vec<FlowDefinition> {
    vec![
        transfer_flow(),
        check_balance_flow(),
        verify_identity_flow(),
        pay_bill_flow(),
        upgrade_flow(),
        counter_flow(),
    ]
}

/// Maps exact texts to classifications; anything else is a plain continuation.
/// The text `boom` makes the classifier fail.
#[derive(Default)]
pub struct ScriptedClassifier {
    rules: HashMap<String, Classification>,
}

#[allow(dead_code)]
impl ScriptedClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, text: &str, classification: Classification) -> Self {
        self.rules.insert(text.to_string(), classification);
        self
    }

    /// The vocabulary shared by most runtime tests.
    pub fn banking() -> Self {
        Self::new()
            .with("transfer", intent("transfer"))
            .with("/transfer", intent("transfer"))
            .with("/check_balance", intent("check_balance"))
            .with("/pay_bill", intent("pay_bill"))
            .with("/unknown", intent("does_not_exist"))
            .with("yes", Classification::new(MessageType::Confirmation).with_command("yes"))
            .with("no", Classification::new(MessageType::Confirmation).with_command("no"))
            .with("maybe", Classification::new(MessageType::Confirmation))
            .with("cancel", Classification::new(MessageType::Cancellation))
            .with("what's the fee?", Classification::new(MessageType::Question))
            .with("tell me a joke", Classification::new(MessageType::Digression))
            .with(
                "actually send it to Bob",
                Classification::new(MessageType::Correction).with_slot("recipient", "Bob"),
            )
            .with(
                "make it 70",
                Classification::new(MessageType::Correction).with_slot("amount", 70i64),
            )
            .with("actually", Classification::new(MessageType::Correction))
    }
}

impl Classifier for ScriptedClassifier {
    fn classify(
        &self,
        request: &NluRequest<'_>,
    ) -> std::result::Result<Classification, CollaboratorError> {
        if request.text == "boom" {
            return Err(CollaboratorError::Classification("model unavailable".to_string()));
        }
        Ok(self
            .rules
            .get(request.text)
            .cloned()
            .unwrap_or_else(|| Classification::new(MessageType::Continuation)))
    }
}

#[allow(dead_code)]
pub fn intent(flow_id: &str) -> Classification {
    Classification::new(MessageType::IntentChange).with_command(flow_id)
}

type Handler = dyn Fn(&str, &SlotMap) -> std::result::Result<ActionResult, CollaboratorError>
    + Send
    + Sync;

/// Runs a closure for every action and records the calls.
pub struct ScriptedActions {
    handler: Box<Handler>,
    calls: Mutex<Vec<(String, SlotMap)>>,
}

#[allow(dead_code)]
impl ScriptedActions {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&str, &SlotMap) -> std::result::Result<ActionResult, CollaboratorError>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Succeeds for every action, answering like a small bank backend.
    pub fn banking() -> Arc<Self> {
        Self::new(|action, slots| {
            Ok(match action {
                "send_money" => ActionResult::empty().with_slot("reference", "TX-1"),
                "fetch_balance" => ActionResult::empty().with_slot("balance", 120i64),
                "increment" => {
                    let count = slots.get("count").and_then(Value::as_f64).unwrap_or(0.0) as i64;
                    ActionResult::empty().with_slot("count", count + 1)
                }
                _ => ActionResult::empty(),
            })
        })
    }

    /// Fails `action` the first `failures` times it runs; everything else succeeds.
    pub fn failing(action: &'static str, failures: usize) -> Arc<Self> {
        let remaining = Mutex::new(failures);
        Self::new(move |name, _| {
            let mut remaining = remaining.lock().unwrap();
            if name == action && *remaining > 0 {
                *remaining -= 1;
                return Err(CollaboratorError::Action {
                    action: name.to_string(),
                    message: "backend timeout".to_string(),
                });
            }
            Ok(ActionResult::empty())
        })
    }

    pub fn calls(&self) -> Vec<(String, SlotMap)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_names(&self) -> Vec<String> {
        self.calls().into_iter().map(|(name, _)| name).collect()
    }
}

impl ActionExecutor for ScriptedActions {
    fn execute(
        &self,
        action: &str,
        slots: &SlotMap,
    ) -> std::result::Result<ActionResult, CollaboratorError> {
        self.calls
            .lock()
            .unwrap()
            .push((action.to_string(), slots.clone()));
        (self.handler)(action, slots)
    }
}

#[allow(dead_code)]
pub fn renderer() -> TemplateRenderer {
    TemplateRenderer::new()
        .with_template("ask_recipient", "Who should receive the money?")
        .with_template("ask_amount", "How much should I send?")
        .with_template("invalid_amount", "The amount must be positive.")
        .with_template("confirm_transfer", "Send {amount} to {recipient}?")
        .with_template("transfer_done", "Done. Reference {reference}.")
        .with_template("transfer_aborted", "Okay, I won't send anything.")
        .with_template("balance_report", "Your balance is {balance}.")
        .with_template("confirm_intent_change", "Switch to {target_flow}?")
        .with_template("cancelled", "Cancelled.")
}

#[allow(dead_code)]
pub fn orchestrator(
    flows: &[FlowDefinition],
    classifier: ScriptedClassifier,
    actions: Arc<ScriptedActions>,
    config: RuntimeConfig,
) -> Arc<Orchestrator> {
    let registry = FlowRegistry::from_config(&config, flows).expect("fixture flows compile");
    Arc::new(Orchestrator::new(
        Arc::new(registry),
        Arc::new(classifier),
        actions,
        Arc::new(renderer()),
        config,
    ))
}

/// A fresh session over the banking fixtures with default settings.
#[allow(dead_code)]
pub fn banking_session(actions: Arc<ScriptedActions>) -> Session {
    let orchestrator = orchestrator(
        &banking_flows(),
        ScriptedClassifier::banking(),
        actions,
        RuntimeConfig::default(),
    );
    Session::new("test", orchestrator)
}

/// Template keys of every message a turn produced, in order.
#[allow(dead_code)]
pub fn templates(outcome: &TurnOutcome) -> Vec<&str> {
    outcome
        .requests
        .iter()
        .map(|request| request.template.as_str())
        .collect()
}

#[allow(dead_code)]
pub fn slots(pairs: &[(&str, Value)]) -> SlotMap {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}
