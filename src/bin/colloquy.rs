use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use colloquy::actions::{ActionHandler, ActionRegistry};
use colloquy::engine::types::{StartTarget, Stmt, Val};
use colloquy::engine::Runtime;
use colloquy::events::Event;
use colloquy::flows::{FlowDefinition, FlowRegistry};
use colloquy::RuntimeConfig;

#[derive(Parser)]
#[command(name = "colloquy")]
#[command(about = "Conversational flow runtime", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a flow bundle against JSON-lines events on stdin
    Run {
        /// Flow bundle (JSON)
        bundle: PathBuf,
        /// Acknowledge emitted actions immediately instead of waiting for a
        /// real actuator
        #[arg(long)]
        auto_ack: bool,
    },
    /// Validate a flow bundle without running it
    Check {
        /// Flow bundle (JSON)
        bundle: PathBuf,
    },
}

/// On-disk shape of a flow bundle.
#[derive(Deserialize)]
struct Bundle {
    #[serde(default)]
    config: RuntimeConfig,
    flows: Vec<FlowDefinition>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { bundle, auto_ack } => run(bundle, auto_ack).await,
        Commands::Check { bundle } => check(bundle),
    }
}

fn load_bundle(path: &PathBuf) -> anyhow::Result<Bundle> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading flow bundle {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing flow bundle {}", path.display()))
}

/* ===================== run ===================== */

async fn run(path: PathBuf, auto_ack: bool) -> anyhow::Result<()> {
    let bundle = load_bundle(&path)?;
    let mut registry = FlowRegistry::new();
    for flow in bundle.flows {
        registry.register(flow);
    }

    let mut runtime = Runtime::new(registry, bundle.config);
    let mut actions = ActionRegistry::new();

    let stdout = std::io::stdout();
    let mut stdout = stdout.lock();

    let initial = runtime.initialize().context("starting main flow")?;
    emit(&mut stdout, &mut runtime, &mut actions, initial, auto_ack).await?;

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let event = parse_external_event(&line)
            .with_context(|| format!("malformed event line: {}", line))?;
        let out = runtime.advance(event).context("processing event")?;
        emit(&mut stdout, &mut runtime, &mut actions, out, auto_ack).await?;
    }
    Ok(())
}

/// Print outgoing events as JSON lines, optionally acknowledging starts
/// through the action registry and feeding the results straight back in.
async fn emit(
    stdout: &mut impl Write,
    runtime: &mut Runtime,
    actions: &mut ActionRegistry,
    mut pending: Vec<Event>,
    auto_ack: bool,
) -> anyhow::Result<()> {
    while !pending.is_empty() {
        let mut feedback = Vec::new();
        for event in pending {
            serde_json::to_writer(&mut *stdout, &event)?;
            writeln!(stdout)?;

            if auto_ack {
                if let colloquy::events::EventKind::ActionStart { action } = event.kind() {
                    if !actions.contains(&action) {
                        actions.register(&action, Arc::new(Ack));
                    }
                    feedback.extend(actions.dispatch(&event).await);
                }
            }
        }
        stdout.flush()?;

        pending = Vec::new();
        for event in feedback {
            pending.extend(runtime.advance(event).context("processing ack")?);
        }
    }
    Ok(())
}

/// Completes every action immediately with a null return value.
struct Ack;

#[async_trait::async_trait]
impl ActionHandler for Ack {
    async fn execute(&self, _arguments: BTreeMap<String, Val>) -> Result<Val, String> {
        Ok(Val::Null)
    }
}

/// Parse one stdin line, filling in the envelope fields a hand-typed event
/// usually omits.
fn parse_external_event(line: &str) -> Result<Event, colloquy::engine::RuntimeError> {
    use colloquy::engine::RuntimeError::MalformedEvent;

    let mut value: serde_json::Value =
        serde_json::from_str(line).map_err(|e| MalformedEvent(e.to_string()))?;
    let map = value
        .as_object_mut()
        .ok_or_else(|| MalformedEvent("event must be a JSON object".to_string()))?;
    if !map.contains_key("uid") {
        map.insert("uid".into(), Uuid::new_v4().to_string().into());
    }
    if !map.contains_key("event_created_at") {
        map.insert(
            "event_created_at".into(),
            chrono::Utc::now().to_rfc3339().into(),
        );
    }
    if !map.contains_key("source_uid") {
        map.insert("source_uid".into(), "stdin".into());
    }
    serde_json::from_value(value).map_err(|e| MalformedEvent(e.to_string()))
}

/* ===================== check ===================== */

fn check(path: PathBuf) -> anyhow::Result<()> {
    let bundle = load_bundle(&path)?;
    let known: std::collections::BTreeSet<&str> =
        bundle.flows.iter().map(|f| f.id.as_str()).collect();

    let mut problems = Vec::new();

    if !known.contains(bundle.config.main_flow_id.as_str()) {
        problems.push(format!(
            "main flow `{}` is not defined",
            bundle.config.main_flow_id
        ));
    }

    let mut seen = std::collections::BTreeSet::new();
    for flow in &bundle.flows {
        if !seen.insert(flow.id.as_str()) {
            problems.push(format!("flow `{}` is defined more than once", flow.id));
        }
        let mut referenced = Vec::new();
        collect_flow_refs(&flow.body, &mut referenced);
        for target in referenced {
            if !known.contains(target.as_str()) {
                problems.push(format!(
                    "flow `{}` references undefined flow `{}`",
                    flow.id, target
                ));
            }
        }
    }

    if problems.is_empty() {
        println!("ok: {} flows", bundle.flows.len());
        Ok(())
    } else {
        for problem in &problems {
            eprintln!("error: {}", problem);
        }
        anyhow::bail!("{} problem(s) found", problems.len());
    }
}

/// Walk a statement tree collecting every flow id it starts or activates.
fn collect_flow_refs(body: &[Stmt], out: &mut Vec<String>) {
    for stmt in body {
        match stmt {
            Stmt::Start { target, .. } => {
                if let StartTarget::Flow { flow_id, .. } = target {
                    out.push(flow_id.clone());
                }
            }
            Stmt::Await { members, .. } => {
                for member in members {
                    if let StartTarget::Flow { flow_id, .. } = &member.target {
                        out.push(flow_id.clone());
                    }
                }
            }
            Stmt::Activate { flow_id, .. } => out.push(flow_id.clone()),
            Stmt::When { branches } => {
                for branch in branches {
                    collect_flow_refs(&branch.body, out);
                }
            }
            Stmt::If {
                then_body,
                else_body,
                ..
            } => {
                collect_flow_refs(then_body, out);
                collect_flow_refs(else_body, out);
            }
            Stmt::While { body, .. } => collect_flow_refs(body, out),
            _ => {}
        }
    }
}
