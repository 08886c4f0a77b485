use clap::Parser;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use taiwa::prelude::*;
use tracing_subscriber::EnvFilter;

// --- JSON Deserialization Structs (Input Format Specific) ---
// These structs match the bot file format and are only used here for conversion.

#[derive(Deserialize)]
struct RawBot {
    flows: RawFlows,
    #[serde(default)]
    templates: BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(transparent)]
struct RawFlows(Vec<RawFlow>);

#[derive(Deserialize)]
struct RawFlow {
    id: String,
    #[serde(default)]
    description: String,
    steps: Vec<RawStep>,
}

#[derive(Deserialize)]
struct RawStep {
    name: String,
    #[serde(rename = "type")]
    step_type: String,
    slot: Option<String>,
    call: Option<String>,
    message: Option<String>,
    input: Option<String>,
    #[serde(default)]
    cases: Vec<RawCase>,
    condition: Option<String>,
    #[serde(default, rename = "do")]
    body: Vec<String>,
    jump_to: Option<String>,
    validation: Option<String>,
    #[serde(default)]
    ask_before_filling: bool,
}

#[derive(Deserialize)]
struct RawCase {
    when: String,
    then: String,
}

// --- Converter Implementation ---

impl IntoFlows for RawFlows {
    fn into_flows(self) -> std::result::Result<Vec<FlowDefinition>, FlowConversionError> {
        self.0
            .into_iter()
            .map(|flow| {
                if flow.id.trim().is_empty() {
                    return Err(FlowConversionError::ValidationError(
                        "every flow needs a non-empty `id`".to_string(),
                    ));
                }
                let steps = flow
                    .steps
                    .into_iter()
                    .map(|raw| {
                        let mut step = StepDefinition::new(&raw.name, &raw.step_type);
                        step.slot = raw.slot;
                        step.call = raw.call;
                        step.message = raw.message;
                        step.input = raw.input;
                        step.condition = raw.condition;
                        step.body = raw.body;
                        step.jump_to = raw.jump_to;
                        step.validation = raw.validation;
                        step.ask_before_filling = raw.ask_before_filling;
                        for case in raw.cases {
                            step = step.with_case(&case.when, &case.then);
                        }
                        step
                    })
                    .collect();
                Ok(FlowDefinition {
                    id: flow.id,
                    description: flow.description,
                    steps,
                })
            })
            .collect()
    }
}

// --- Collaborators for terminal use ---

/// A keyword matcher standing in for a real NLU.
struct KeywordClassifier;

impl Classifier for KeywordClassifier {
    fn classify(
        &self,
        request: &NluRequest<'_>,
    ) -> std::result::Result<Classification, CollaboratorError> {
        let text = request.text.trim();
        let lower = text.to_ascii_lowercase();

        if let Some(flow_id) = text.strip_prefix('/') {
            return Ok(Classification::new(MessageType::IntentChange).with_command(flow_id.trim()));
        }
        let classification = match lower.as_str() {
            "cancel" | "stop" | "quit" => Classification::new(MessageType::Cancellation),
            "yes" | "y" | "ok" => Classification::new(MessageType::Confirmation).with_command("yes"),
            "no" | "n" => Classification::new(MessageType::Confirmation).with_command("no"),
            _ if lower.ends_with('?') => Classification::new(MessageType::Question),
            _ => match (lower.strip_prefix("actually "), request.waiting_for_slot) {
                (Some(_), Some(slot)) => Classification::new(MessageType::Correction)
                    .with_slot(slot, Value::infer(&text["actually ".len()..])),
                _ => Classification::new(MessageType::Continuation),
            },
        };
        Ok(classification)
    }
}

/// Pretends every action succeeds and reports it as an `<action>_done` slot.
struct EchoActions;

impl ActionExecutor for EchoActions {
    fn execute(
        &self,
        action: &str,
        slots: &SlotMap,
    ) -> std::result::Result<ActionResult, CollaboratorError> {
        println!("  [action] {} with {} slot(s)", action, slots.len());
        Ok(ActionResult::empty().with_slot(&format!("{}_done", action), true))
    }
}

/// Runs conversational flows from a bot definition file in the terminal
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the bot JSON file (flows and templates)
    bot_path: String,

    /// Optional path to a runtime settings JSON file
    #[arg(short, long)]
    config: Option<String>,

    /// Print the compiled step graphs and exit
    #[arg(short, long)]
    graph: bool,

    /// Start this flow before reading any input
    #[arg(short, long)]
    start: Option<String>,

    /// Session id used for the conversation
    #[arg(long, default_value = "cli")]
    session: String,

    /// Write the final session snapshot (JSON) to this path
    #[arg(long)]
    snapshot: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    // --- 1. Loading and Conversion ---
    let config = match &cli.config {
        Some(path) => {
            let json = fs::read_to_string(path).unwrap_or_else(|e| {
                exit_with_error(&format!("Failed to read config file '{}': {}", path, e))
            });
            RuntimeConfig::from_json_str(&json)
                .unwrap_or_else(|e| exit_with_error(&format!("Invalid config: {}", e)))
        }
        None => RuntimeConfig::default(),
    };
    let bot_json = fs::read_to_string(&cli.bot_path).unwrap_or_else(|e| {
        exit_with_error(&format!("Failed to read bot file '{}': {}", cli.bot_path, e))
    });
    let raw_bot: RawBot = serde_json::from_str(&bot_json)
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to parse bot JSON: {}", e)));
    let flows = raw_bot
        .flows
        .into_flows()
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to convert flows: {}", e)));

    // --- 2. Compilation ---
    let registry = FlowRegistry::from_config(&config, &flows)
        .unwrap_or_else(|e| exit_with_error(&format!("Flow compilation failed: {}", e)));

    if cli.graph {
        let set = registry.snapshot();
        let mut ids: Vec<&str> = set.flow_ids().collect();
        ids.sort_unstable();
        for id in ids {
            if let Some(graph) = set.get(id) {
                println!("{}", graph);
            }
        }
        return;
    }

    // --- 3. Conversation ---
    let renderer = TemplateRenderer::new().with_templates(raw_bot.templates);
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(registry),
        Arc::new(KeywordClassifier),
        Arc::new(EchoActions),
        Arc::new(renderer),
        config,
    ));
    let mut session = Session::new(&cli.session, orchestrator);

    if let Some(flow_id) = &cli.start {
        match session.start_flow(flow_id, SlotMap::new()) {
            Ok(outcome) => print_outcome(&outcome),
            Err(e) => exit_with_error(&format!("Could not start flow '{}': {}", flow_id, e)),
        }
    }

    let stdin = io::stdin();
    prompt();
    for line in stdin.lock().lines() {
        let line = line.unwrap_or_else(|e| exit_with_error(&format!("Failed to read input: {}", e)));
        if line.trim().is_empty() {
            prompt();
            continue;
        }
        match session.handle_turn(&line) {
            Ok(outcome) => print_outcome(&outcome),
            Err(e) => eprintln!("Turn failed: {}", e),
        }
        prompt();
    }

    // --- 4. Summary ---
    let state = session.state();
    println!("\n--- Session Summary ---");
    println!("Turns:        {}", state.turn_count());
    println!("Final State:  {}", state.conversation_state());
    for (name, count) in state.metadata().counters() {
        println!("  {:<14}{}", name, count);
    }

    if let Some(path) = &cli.snapshot {
        let json = session
            .snapshot()
            .to_json()
            .unwrap_or_else(|e| exit_with_error(&format!("Snapshot failed: {}", e)));
        fs::write(path, json)
            .unwrap_or_else(|e| exit_with_error(&format!("Failed to write '{}': {}", path, e)));
        println!("Snapshot written to {}", path);
    }
}

fn print_outcome(outcome: &TurnOutcome) {
    for response in &outcome.responses {
        println!("bot: {}", response);
    }
    if let Some(error) = &outcome.error {
        eprintln!("  ({})", error);
    }
}

fn prompt() {
    print!("you> ");
    // A failed flush only delays the prompt.
    let _ = io::stdout().flush();
}

fn exit_with_error(message: &str) -> ! {
    eprintln!("\nError: {}", message);
    std::process::exit(1);
}
