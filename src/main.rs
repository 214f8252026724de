//! FlowGuard CLI Entry Point
//!
//! Provides command-line interface for workflow execution.
//!
//! # Usage
//!
//! ```bash
//! # Execute a workflow with the built-in math engine
//! flowguard credit.yaml --input request.json
//!
//! # Inline input and an audit log
//! flowguard credit.yaml --input-json '{"amount": 100}' --audit-log audit.jsonl
//!
//! # Inspect the dependency graph without running
//! flowguard credit.yaml --analyze
//!
//! # Engine tuning from YAML, overriding parallelism
//! flowguard credit.yaml --config engine.yaml --parallel 8
//! ```
//!
//! Exit status is 0 for a completed run, 2 for a run awaiting approval
//! and 1 for a failed run or any error.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use log::{error, info};
use serde_json::Value;

use flowguard::execution::{EngineRegistry, MathEngine, Orchestrator, StepStatus};
use flowguard::monitoring::JsonLinesAuditSink;
use flowguard::workflow::{GraphBuilder, InMemoryDefinitionStore};
use flowguard::{load_definition, EngineConfig, RunStatus, WorkflowExecution, APP_NAME, VERSION};

/// Default workflow file used when none is specified.
const DEFAULT_WORKFLOW: &str = "workflow.yaml";

/// Exit status of a run halted for approval.
const EXIT_AWAITING_APPROVAL: u8 = 2;

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Config {
    workflow_path: String,
    input_path: Option<PathBuf>,
    input_json: Option<String>,
    user_id: String,
    config_path: Option<PathBuf>,
    audit_log: Option<PathBuf>,
    max_parallel: Option<usize>,
    analyze: bool,
    json: bool,
    verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workflow_path: DEFAULT_WORKFLOW.to_string(),
            input_path: None,
            input_json: None,
            user_id: "cli".to_string(),
            config_path: None,
            audit_log: None,
            max_parallel: None,
            analyze: false,
            json: false,
            verbose: false,
        }
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME.bold(), VERSION);
    println!("Risk-Aware Workflow Execution Engine");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: flowguard [OPTIONS] <WORKFLOW_FILE>");
    println!();
    println!("Arguments:");
    println!("  <WORKFLOW_FILE>       Path to workflow definition YAML file");
    println!();
    println!("Options:");
    println!("  --input FILE          JSON file with the run input");
    println!("  --input-json JSON     Run input given inline");
    println!("  --user ID             Requesting user (default: cli)");
    println!("  --config FILE         Engine configuration YAML");
    println!("  --audit-log FILE      Append audit entries to a JSON-lines file");
    println!("  --parallel N          Maximum concurrent steps");
    println!("  --analyze             Print the dependency analysis and exit");
    println!("  --json                Print the run record as JSON");
    println!("  --verbose             Enable debug logging");
    println!("  --help                Show this help message");
    println!("  --version             Show version information");
    println!();
    println!("Examples:");
    println!("  flowguard credit.yaml --input request.json");
    println!("  flowguard credit.yaml --analyze");
    println!("  flowguard credit.yaml --audit-log audit.jsonl --parallel 8");
}

/// Returns the value following option `name`.
fn option_value<'a>(args: &'a [String], i: &mut usize, name: &str) -> Result<&'a String, String> {
    *i += 1;
    args.get(*i).ok_or_else(|| format!("{} requires an argument", name))
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut positional_index = 0;
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--analyze" => config.analyze = true,
            "--json" => config.json = true,
            "--verbose" | "-v" => config.verbose = true,
            "--input" => config.input_path = Some(PathBuf::from(option_value(args, &mut i, "--input")?)),
            "--input-json" => config.input_json = Some(option_value(args, &mut i, "--input-json")?.clone()),
            "--user" => config.user_id = option_value(args, &mut i, "--user")?.clone(),
            "--config" => config.config_path = Some(PathBuf::from(option_value(args, &mut i, "--config")?)),
            "--audit-log" => config.audit_log = Some(PathBuf::from(option_value(args, &mut i, "--audit-log")?)),
            "--parallel" => {
                let value = option_value(args, &mut i, "--parallel")?;
                config.max_parallel = Some(
                    value
                        .parse()
                        .map_err(|_| format!("Invalid parallel value: {}", value))?,
                );
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                match positional_index {
                    0 => config.workflow_path = arg.clone(),
                    _ => return Err(format!("Unexpected argument: {}", arg)),
                }
                positional_index += 1;
            }
        }
        i += 1;
    }

    if config.input_path.is_some() && config.input_json.is_some() {
        return Err("--input and --input-json are mutually exclusive".to_string());
    }

    Ok(config)
}

/// Reads the run input from the configured source, defaulting to `{}`.
fn load_input(config: &Config) -> Result<Value, Box<dyn std::error::Error>> {
    let text = match (&config.input_path, &config.input_json) {
        (Some(path), _) => fs::read_to_string(path)
            .map_err(|e| format!("Could not read input '{}': {}", path.display(), e))?,
        (None, Some(json)) => json.clone(),
        (None, None) => return Ok(Value::Object(Default::default())),
    };
    Ok(serde_json::from_str(&text)?)
}

/// Builds the engine configuration from file and command-line overrides.
fn engine_config(config: &Config) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let mut engine_config = match &config.config_path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(max_parallel) = config.max_parallel {
        engine_config.max_parallel = max_parallel;
    }
    if let Some(path) = &config.audit_log {
        engine_config.audit_log = Some(path.clone());
    }
    engine_config.validate()?;
    Ok(engine_config)
}

/// Prints a human-readable summary of a finished run.
fn print_summary(execution: &WorkflowExecution) {
    println!();
    println!("Run {}", execution.run_id);
    println!("  Workflow: {} v{}", execution.workflow_id, execution.workflow_version);
    println!();

    for result in &execution.step_results {
        let marker = match result.status {
            StepStatus::Completed => "✓".green(),
            StepStatus::CompletedWithFallback => "✓".yellow(),
            StepStatus::Skipped => "-".dimmed(),
            StepStatus::Failed => "✗".red(),
        };
        let detail = result.error.as_deref().unwrap_or("");
        println!(
            "  {} step {:<3} {:<24} {:>6} ms  {}",
            marker, result.step_number, result.target, result.duration_ms, detail
        );
    }

    println!("{}", execution.timeline.gantt_chart());
    println!("  Cumulative risk: {:.3}", execution.cumulative_risk);

    let status = match execution.status {
        RunStatus::Completed => "COMPLETED".green().bold(),
        RunStatus::AwaitingApproval => "AWAITING APPROVAL".yellow().bold(),
        RunStatus::Failed => "FAILED".red().bold(),
        RunStatus::Running => "RUNNING".normal(),
    };
    println!("  Status: {}", status);
    println!("  {}", execution.message);

    if let Some(request) = &execution.approval_request {
        println!();
        println!("{}", "Approval required".yellow().bold());
        println!("  Decision point: {}", request.decision_point);
        println!("  Intervention: {}", request.intervention_type);
        println!("  Priority: {:?}", request.priority);
        println!("  Minimum approver seniority: {}", request.min_approver_seniority);
        if let Some(expires_at) = request.expires_at {
            println!("  Expires: {}", expires_at.to_rfc3339());
        }
        println!("  Triggered rules: {}", request.triggered_rule_ids.join(", "));
    }
}

/// Main application entry point.
fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    setup_logging(config.verbose);
    if !config.json {
        print_banner();
    }

    // Load workflow
    info!("Loading workflow: {}", config.workflow_path);
    let definition = load_definition(&config.workflow_path).map_err(|e| {
        error!("Failed to load workflow: {}", e);
        format!("Could not load workflow from '{}': {}", config.workflow_path, e)
    })?;

    if config.analyze {
        let analysis = GraphBuilder::new().analyze(&definition);
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(if analysis.validation_errors.is_empty() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    let engine_config = engine_config(&config)?;
    let input = load_input(&config)?;
    let definition_id = definition.id.clone();

    let store = InMemoryDefinitionStore::new();
    store.insert(definition)?;
    let registry = EngineRegistry::new().with_engine(Arc::new(MathEngine))?;

    let audit_log = engine_config.audit_log.clone();
    let mut orchestrator = Orchestrator::new(Arc::new(store), registry, engine_config);
    if let Some(path) = audit_log {
        info!("Audit log: {}", path.display());
        orchestrator = orchestrator.with_audit_sink(Arc::new(JsonLinesAuditSink::open(&path)?));
    }

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let execution = runtime.block_on(orchestrator.execute(&definition_id, input, &config.user_id))?;

    if config.json {
        println!("{}", serde_json::to_string_pretty(&execution)?);
    } else {
        print_summary(&execution);
    }

    Ok(match execution.status {
        RunStatus::Completed => ExitCode::SUCCESS,
        RunStatus::AwaitingApproval => ExitCode::from(EXIT_AWAITING_APPROVAL),
        RunStatus::Failed | RunStatus::Running => ExitCode::FAILURE,
    })
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
