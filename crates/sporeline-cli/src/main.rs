//! Sporeline command-line driver
//!
//! Reads JSON inputs, runs the pipeline in-process and prints pretty JSON
//! on stdout. Diagnostics go to stderr through `tracing`.

mod scenario;

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sporeline_core::{
    dependency_order, EngineInput, ExecutionLog, ExecutionService, ExecutionStep, GateOptions,
    PipelineConfig, PipelineError, SafetyGate, StepId, TelemetrySnapshot,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("sporeline")
        .version(sporeline_core::VERSION)
        .about("Execution planning and safety gating for cultivation facilities")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Pipeline configuration (TOML)"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit diagnostics as JSON lines on stderr"),
        )
        .subcommand(
            Command::new("plan")
                .about("Ingest upstream plans and print the sequenced execution plan")
                .arg(
                    Arg::new("input")
                        .long("input")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Engine input (JSON)"),
                ),
        )
        .subcommand(
            Command::new("run")
                .about("Replay a scenario: ingest, approve, then monitor and update steps")
                .arg(
                    Arg::new("scenario")
                        .long("scenario")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Scenario (JSON)"),
                ),
        )
        .subcommand(
            Command::new("gate")
                .about("Evaluate one step against a telemetry snapshot")
                .arg(
                    Arg::new("step")
                        .long("step")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Execution step (JSON)"),
                )
                .arg(
                    Arg::new("telemetry")
                        .long("telemetry")
                        .value_parser(value_parser!(PathBuf))
                        .help("Telemetry snapshot (JSON); omitted means nothing to check"),
                )
                .arg(
                    Arg::new("emergency-stop")
                        .long("emergency-stop")
                        .action(ArgAction::SetTrue)
                        .help("Evaluate with the emergency stop engaged"),
                ),
        )
}

#[derive(Serialize)]
struct PlanOutput {
    plan: sporeline_core::ExecutionPlan,
    #[serde(skip_serializing_if = "Option::is_none")]
    dependency_order: Option<Vec<StepId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dependency_cycle: Option<Vec<StepId>>,
}

fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    match matches.subcommand() {
        Some(("plan", args)) => plan(config, args),
        Some(("run", args)) => run(config, args),
        Some(("gate", args)) => gate(&config, args),
        _ => unreachable!("subcommand is required"),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn plan(config: PipelineConfig, args: &ArgMatches) -> Result<()> {
    let input: EngineInput = read_json(required_path(args, "input")?)?;
    let service = ExecutionService::new(config)?;

    let steps = service.ingest(&input);
    let plan = service.sequence(steps);

    let (order, cycle) = match dependency_order(&plan) {
        Ok(order) => (Some(order), None),
        Err(PipelineError::DependencyCycle(ids)) => {
            tracing::warn!(steps = ids.len(), "dependencies contain a cycle");
            (None, Some(ids))
        }
        Err(e) => return Err(e.into()),
    };

    print_json(&PlanOutput {
        plan,
        dependency_order: order,
        dependency_cycle: cycle,
    })
}

fn run(config: PipelineConfig, args: &ArgMatches) -> Result<()> {
    let scenario: scenario::Scenario = read_json(required_path(args, "scenario")?)?;
    let service = ExecutionService::new(config)?;
    let report = scenario::run(&service, &scenario)?;
    tracing::debug!(version = report.plan().version, "scenario report ready");
    print_json(&report)
}

fn gate(config: &PipelineConfig, args: &ArgMatches) -> Result<()> {
    let step: ExecutionStep = read_json(required_path(args, "step")?)?;
    let telemetry: Option<TelemetrySnapshot> = args
        .get_one::<PathBuf>("telemetry")
        .map(|p| read_json(p))
        .transpose()?;

    let mut options = GateOptions::from(&config.gate);
    if args.get_flag("emergency-stop") {
        options = options.emergency();
    }

    let log = Arc::new(ExecutionLog::new(config.log_capacity));
    let gate = SafetyGate::new(&config.gate, log);
    let result = gate.evaluate_step(&step, telemetry.as_ref(), &options);
    print_json(&result)
}

fn required_path<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a PathBuf> {
    args.get_one::<PathBuf>(name)
        .with_context(|| format!("missing --{name}"))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("serializing output")?;
    println!("{out}");
    Ok(())
}
