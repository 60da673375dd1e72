//! bpmn-engine-runner: deploy process models and play a scenario through one
//! partition, printing every record as a JSON line.
//!
//! Usage:
//!   bpmn-engine-runner --process demos/order_fulfillment.yaml --scenario demos/order_scenario.yaml
//!   bpmn-engine-runner --config engine.yaml --process a.yaml --process b.yaml --scenario s.yaml

mod scenario;

use anyhow::{Context, Result};
use bpmn_engine_core::{
    ControlledClock, EngineConfig, MemoryLog, Partition, ProcessRepository, Record,
    SimpleExpressionEvaluator,
};
use clap::Parser;
use scenario::{Scenario, ScenarioRunner};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "bpmn-engine-runner")]
#[command(about = "Run a scripted scenario against BPMN process models")]
struct Args {
    /// Engine configuration (YAML). BPMN_ENGINE_* variables override it.
    #[arg(short, long, env = "BPMN_ENGINE_CONFIG")]
    config: Option<PathBuf>,

    /// Process model (YAML) to deploy. Repeat for several models.
    #[arg(short, long = "process", required = true)]
    processes: Vec<PathBuf>,

    /// Scenario of commands to play.
    #[arg(short, long)]
    scenario: PathBuf,

    /// Print the state fingerprint after the last step.
    #[arg(long)]
    fingerprint: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,bpmn_engine_core=debug".into()),
        )
        .init();

    let args = Args::parse();
    let config = EngineConfig::load(args.config.as_deref())?;

    let repository = Arc::new(ProcessRepository::new());
    for path in &args.processes {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read process model {}", path.display()))?;
        repository
            .deploy_yaml(&yaml)
            .with_context(|| format!("failed to deploy {}", path.display()))?;
    }

    let scenario = Scenario::load(&args.scenario)?;
    let clock = Arc::new(ControlledClock::new(scenario.start_time));
    let mut partition = Partition::open(
        config,
        repository,
        Arc::new(SimpleExpressionEvaluator::new()),
        Arc::new(MemoryLog::new()),
        clock.clone(),
    )
    .await?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    {
        let mut runner = ScenarioRunner::new(&mut partition, |millis| {
            clock.advance(millis);
        });
        for (index, step) in scenario.steps.iter().enumerate() {
            tracing::debug!(index, ?step, "running step");
            let records = runner
                .run_step(step)
                .await
                .with_context(|| format!("step {} failed", index + 1))?;
            print_records(&mut out, &records)?;
        }
    }

    if args.fingerprint {
        writeln!(out, "{}", partition.state().fingerprint())?;
    }
    tracing::info!(steps = scenario.steps.len(), "scenario finished");
    Ok(())
}

fn print_records(out: &mut impl Write, records: &[Record]) -> Result<()> {
    for record in records {
        writeln!(out, "{}", serde_json::to_string(record)?)?;
    }
    Ok(())
}
