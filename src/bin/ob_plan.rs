//! Onboarding Plan CLI
//!
//! Dry-run front end for the plan compiler and the lifecycle state machine.
//!
//! Usage:
//!   cargo run --features cli --bin ob_plan -- plan --ops onboarding.yaml
//!   cargo run --features cli --bin ob_plan -- plan --ops onboarding.yaml --json
//!   cargo run --features cli --bin ob_plan -- plan --ops onboarding.yaml --simulate
//!   cargo run --features cli --bin ob_plan -- path OPPORTUNITY ACTIVE
//!
//! The ops file is a YAML list of `{verb, parameters, source_line}` records.
//! Registries and tuning come from `--config-dir`, else `OB_CONFIG_DIR`, else
//! `./config`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};

use ob_onboarding::compiler::describe_plan;
use ob_onboarding::config::ConfigLoader;
use ob_onboarding::executor::{OperationHandler, PlanExecutor};
use ob_onboarding::{LifecycleStateMachine, Operation, OperationSpec, PlanCompiler};

#[derive(Parser, Debug)]
#[command(name = "ob_plan")]
#[command(about = "Compile onboarding operations into an execution plan")]
struct Args {
    /// Config directory holding verbs.yaml, attributes.yaml, onboarding.yaml
    #[arg(long, short = 'c', env = "OB_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile an operations file and print the plan with its diagnostics
    Plan {
        /// YAML list of operations
        #[arg(long, short = 'o')]
        ops: PathBuf,

        /// Output the full compilation result as JSON
        #[arg(long)]
        json: bool,

        /// Walk the plan through the executor with a no-op handler
        #[arg(long)]
        simulate: bool,
    },
    /// Shortest legal lifecycle path between two states
    Path { from: String, to: String },
}

/// Handler that performs nothing and echoes the operation back
struct EchoHandler;

#[async_trait]
impl OperationHandler for EchoHandler {
    async fn execute(&self, operation: &Operation) -> Result<serde_json::Value> {
        tracing::info!(verb = operation.verb(), line = operation.source_line(), "simulated");
        Ok(serde_json::json!({ "simulated": operation.describe() }))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let args = Args::parse();
    let loader = match args.config_dir {
        Some(dir) => ConfigLoader::new(dir),
        None => ConfigLoader::from_env(),
    };

    match args.command {
        Command::Plan { ops, json, simulate } => run_plan(&loader, ops, json, simulate).await,
        Command::Path { from, to } => run_path(&from, &to),
    }
}

async fn run_plan(
    loader: &ConfigLoader,
    ops_path: PathBuf,
    json: bool,
    simulate: bool,
) -> Result<()> {
    let content = std::fs::read_to_string(&ops_path)
        .with_context(|| format!("Failed to read {}", ops_path.display()))?;
    let specs: Vec<OperationSpec> = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", ops_path.display()))?;
    let ops = specs
        .into_iter()
        .map(|s| Operation::try_new(s.verb, s.parameters, s.source_line))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let compiler = PlanCompiler::from_loader(loader)?;
    let result = compiler.compile(&ops);

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        if let Some(plan) = &result.plan {
            println!("{}", describe_plan(plan));
        }
        for diagnostic in result.diagnostics() {
            println!("{}", diagnostic);
        }
        for record in &result.optimizations {
            println!("[{}] {}", record.pass, record.description);
        }
    }

    if simulate {
        let config = loader.load_config()?;
        let executor = PlanExecutor::new(Arc::new(EchoHandler), config.executor);
        let report = executor.execute_compiled(&result).await?;
        println!(
            "Simulated {} operations across {} phases",
            report.completed(),
            report.phases.len()
        );
    }

    if !result.is_executable() {
        std::process::exit(1);
    }
    Ok(())
}

fn run_path(from: &str, to: &str) -> Result<()> {
    let machine = LifecycleStateMachine::new();
    let path = machine.state_transition_path_named(from, to)?;
    let names: Vec<&str> = path.iter().map(|s| s.as_str()).collect();
    println!("{}", names.join(" -> "));
    Ok(())
}
