//! Nuclear Plant Operator Training Simulator - Main Entry Point
//!
//! Runs one scenario headless, either paced in real time by the periodic
//! driver or as fast as possible, and prints the final plant snapshot.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use npp_simulator_lib::config::SimConfig;
use npp_simulator_lib::procedure::{ProcedureGraph, RuleBook};
use npp_simulator_lib::{driver, loader, Scenario, Simulator, Trajectory};

#[derive(Parser, Debug)]
#[command(
    name = "npp-simulator",
    version,
    about = "Operator training simulator for feedwater faults"
)]
struct Args {
    /// Configuration file (defaults to config/simulator.json if present)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(value_enum, long, default_value = "control-valve")]
    scenario: Scenario,

    /// Simulated time to run [s]
    #[arg(long, default_value_t = 60.0)]
    seconds: f64,

    /// Pace the run with the wall clock instead of running flat out
    #[arg(long)]
    realtime: bool,

    /// Disable display noise so displayed values equal true values
    #[arg(long)]
    deterministic: bool,

    /// RNG seed for reproducible display noise
    #[arg(long)]
    seed: Option<u64>,

    /// Procedure entity table (CSV)
    #[arg(long, requires = "graph_relationships")]
    graph_entities: Option<PathBuf>,

    /// Procedure relationship table (CSV)
    #[arg(long, requires = "graph_entities")]
    graph_relationships: Option<PathBuf>,

    /// Procedure rule table (CSV)
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Write the session log as JSON
    #[arg(long)]
    export: Option<PathBuf>,
}

fn load_graph(args: &Args, config: &SimConfig) -> Result<ProcedureGraph> {
    let entities = args.graph_entities.as_ref().or(config.data.entities.as_ref());
    let relationships = args.graph_relationships.as_ref().or(config.data.relationships.as_ref());
    let graph = match (entities, relationships) {
        (Some(entities), Some(relationships)) => loader::load_graph(entities, relationships)?,
        _ => loader::builtin_graph()?,
    };
    Ok(graph)
}

fn load_rules(args: &Args, config: &SimConfig) -> Result<RuleBook> {
    let rules = match args.rules.as_ref().or(config.data.rules.as_ref()) {
        Some(path) => loader::load_rules(path)?,
        None => loader::builtin_rules()?,
    };
    Ok(rules)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::init();

    let args = Args::parse();

    let mut config = SimConfig::load(args.config.as_deref()).context("loading configuration")?;
    if args.deterministic {
        config.noise.enabled = false;
    }
    if args.seed.is_some() {
        config.noise.seed = args.seed;
    }

    let graph = load_graph(&args, &config).context("loading procedure graph")?;
    let rules = load_rules(&args, &config).context("loading procedure rules")?;

    let simulator = Arc::new(Simulator::new(config, graph, rules));
    simulator.set_scenario(args.scenario);
    simulator.begin_procedure();

    let seconds = args.seconds.max(0.0);
    if args.realtime {
        let handle = driver::spawn(Arc::clone(&simulator));
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        handle.stop().await;
    } else {
        let steps = (seconds / simulator.config().dt()).ceil() as u64;
        let mut trajectory = Trajectory::new();
        for _ in 0..steps {
            simulator.step();
            trajectory.record(&simulator.plant_state().process);
        }
        if let Some(levels) = trajectory.column("sg_level") {
            let min_level = levels.iter().copied().fold(f64::INFINITY, f64::min);
            info!("[main] {} steps, minimum SG level {:.1}%", trajectory.len(), min_level);
        }
    }

    let snapshot = simulator.snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    if let Some(path) = &args.export {
        simulator
            .export_session_log(path)
            .with_context(|| format!("exporting session log to {}", path.display()))?;
        info!("[main] Session log written to {}", path.display());
    }

    Ok(())
}
