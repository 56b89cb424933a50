use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use netbench_abstract::{
    ExperimentConfig, Scenario, ScenarioParams, SweepMatrix, TrafficMode, TransportDefaults,
};
use netbench_core::aggregate::aggregate_source;
use netbench_core::summary::{load_reports, render_csv, render_table};
use netbench_core::{ExperimentReport, assign_all, reduce, summarize};
use netbench_simulator::{SimulationReport, Simulator};

#[derive(Parser, Debug)]
#[command(author, version, about = "Wireless access network experiment harness")]
struct Cli {
    /// Log at DEBUG instead of INFO.
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one experiment and write its report.
    Run(RunArgs),
    /// Run every combination of a client/traffic/mobility/seed matrix.
    Sweep(SweepArgs),
    /// Average a directory of reports over seeds.
    Summarize(SummarizeArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Load parameters and experiment overrides from a TOML scenario.
    #[arg(long)]
    scenario: Option<PathBuf>,

    #[arg(long)]
    clients: Option<u32>,

    /// cbr, bulk or mixed (0, 1 and 2 are accepted too).
    #[arg(long)]
    traffic: Option<TrafficMode>,

    #[arg(long)]
    mobility: Option<bool>,

    #[arg(long)]
    seed: Option<u64>,

    #[command(flatten)]
    window: WindowArgs,

    #[arg(long, default_value = "results")]
    output_dir: PathBuf,

    /// Write a JSON trace of the finished simulation.
    #[arg(long)]
    trace_out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SweepArgs {
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Comma-separated client counts.
    #[arg(long, value_delimiter = ',')]
    clients: Vec<u32>,

    #[arg(long, value_delimiter = ',')]
    traffic: Vec<TrafficMode>,

    #[arg(long, value_delimiter = ',')]
    mobility: Vec<bool>,

    #[arg(long, value_delimiter = ',')]
    seeds: Vec<u64>,

    #[command(flatten)]
    window: WindowArgs,

    #[arg(long, default_value = "results")]
    output_dir: PathBuf,
}

#[derive(Args, Debug)]
struct WindowArgs {
    /// Sender start time, seconds.
    #[arg(long)]
    start: Option<f64>,
    /// Sender stop time, seconds.
    #[arg(long)]
    stop: Option<f64>,
}

#[derive(Args, Debug)]
struct SummarizeArgs {
    /// Directory holding the report files.
    #[arg(default_value = "results")]
    dir: PathBuf,

    /// Number of report files a complete sweep should have produced.
    #[arg(long)]
    expected: Option<usize>,

    /// Also write the averaged table as CSV.
    #[arg(long)]
    csv: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    info!("netbench starting…");

    match cli.command {
        Command::Run(args) => run(args),
        Command::Sweep(args) => sweep(args),
        Command::Summarize(args) => summarize_dir(args),
    }
}

fn init_logging(verbose: bool) {
    if verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }
}

/// Scenario file (if any) with no overrides applied yet.
struct Setup {
    config: ExperimentConfig,
    params: ScenarioParams,
    transport: TransportDefaults,
    sweep: Option<SweepMatrix>,
}

impl Setup {
    fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = ExperimentConfig::default();
        let Some(path) = path else {
            return Ok(Self {
                config,
                params: ScenarioParams::default(),
                transport: TransportDefaults::default(),
                sweep: None,
            });
        };
        let scenario = load_scenario(path)?;
        info!("Loaded scenario '{}'", scenario.name);
        if !scenario.description.is_empty() {
            info!("{}", scenario.description);
        }
        scenario.experiment.apply_to(&mut config);
        Ok(Self {
            config,
            params: scenario.params,
            transport: scenario.transport,
            sweep: scenario.sweep,
        })
    }
}

impl WindowArgs {
    fn apply_to(&self, config: &mut ExperimentConfig) {
        if let Some(v) = self.start {
            config.window.start = v;
        }
        if let Some(v) = self.stop {
            config.window.stop = v;
        }
    }
}

impl RunArgs {
    fn apply_to(&self, config: &mut ExperimentConfig) {
        if let Some(v) = self.clients {
            config.clients = v;
        }
        if let Some(v) = self.traffic {
            config.traffic = v;
        }
        if let Some(v) = self.mobility {
            config.mobility = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        self.window.apply_to(config);
    }
}

impl SweepArgs {
    fn apply_to(&self, matrix: &mut SweepMatrix) {
        if !self.clients.is_empty() {
            matrix.clients = self.clients.clone();
        }
        if !self.traffic.is_empty() {
            matrix.traffic = self.traffic.clone();
        }
        if !self.mobility.is_empty() {
            matrix.mobility = self.mobility.clone();
        }
        if !self.seeds.is_empty() {
            matrix.seeds = self.seeds.clone();
        }
    }
}

fn run(args: RunArgs) -> Result<()> {
    let mut setup = Setup::load(args.scenario.as_deref())?;
    args.apply_to(&mut setup.config);

    let (report, trace) = run_experiment(&setup.config, &setup.params, &setup.transport)?;
    print!("{}", report.render_console());

    let path = report
        .write_to_dir(&args.output_dir)
        .context("Failed to write report")?;
    info!("Results written to {}", path.display());

    if let Some(trace_path) = &args.trace_out {
        write_trace(trace_path, &trace)?;
    }
    Ok(())
}

fn sweep(args: SweepArgs) -> Result<()> {
    let mut setup = Setup::load(args.scenario.as_deref())?;
    args.window.apply_to(&mut setup.config);
    let mut matrix = setup.sweep.take().unwrap_or_default();
    args.apply_to(&mut matrix);

    if matrix.is_empty() {
        anyhow::bail!("Sweep matrix is empty");
    }

    let configs = matrix.configs(setup.config.window);
    let total = configs.len();
    info!(
        "Sweep: {} runs into {}",
        total,
        args.output_dir.display()
    );
    for (i, config) in configs.iter().enumerate() {
        info!(
            "[{}/{}] {} clients, {}, {}, seed {}",
            i + 1,
            total,
            config.clients,
            config.traffic,
            netbench_core::report::mobility_label(config.mobility),
            config.seed
        );
        let (report, _) = run_experiment(config, &setup.params, &setup.transport)?;
        let path = report
            .write_to_dir(&args.output_dir)
            .context("Failed to write report")?;
        info!(
            "  {:.3} Mbps, {:.2} ms, PDR {:.2}% -> {}",
            report.metrics.throughput_mbps,
            report.metrics.mean_delay_ms,
            report.metrics.pdr_percent,
            path.display()
        );
    }
    info!("Sweep complete: {} runs", total);
    Ok(())
}

fn summarize_dir(args: SummarizeArgs) -> Result<()> {
    let records = load_reports(&args.dir)
        .with_context(|| format!("Failed to read reports from {}", args.dir.display()))?;
    let expected = args
        .expected
        .unwrap_or_else(|| SweepMatrix::default().len());
    if records.len() != expected {
        warn!(
            "Found {} reports in {}, expected {}",
            records.len(),
            args.dir.display(),
            expected
        );
    }

    let groups = summarize(&records);
    print!("{}", render_table(&groups));

    if let Some(path) = &args.csv {
        fs::write(path, render_csv(&groups))
            .with_context(|| format!("Failed to write CSV file {}", path.display()))?;
        info!("Summary written to {}", path.display());
    }
    Ok(())
}

/// Assign traffic, simulate, then reduce the flow statistics.
fn run_experiment(
    config: &ExperimentConfig,
    params: &ScenarioParams,
    transport: &TransportDefaults,
) -> Result<(ExperimentReport, SimulationReport)> {
    let assignments = assign_all(config.clients, config.traffic);
    let mut sim = Simulator::new(
        config.clone(),
        params.clone(),
        transport.clone(),
        assignments,
    )
    .context("Invalid experiment configuration")?;
    sim.run_until_complete();

    let aggregation = aggregate_source(sim.flow_monitor(), sim.server_address(), config.window);
    let metrics = reduce(&aggregation.totals, config.window);
    Ok((
        ExperimentReport::new(config.clone(), aggregation, metrics),
        sim.export_report(),
    ))
}

fn load_scenario(path: &Path) -> Result<Scenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    let scenario = Scenario::from_toml_str(&content).context("Failed to parse scenario file")?;
    Ok(scenario)
}

fn write_trace(path: &Path, report: &SimulationReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize simulation trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    Ok(())
}
