//! # modsweep
//!
//! Command-line run control for a modulator sweep bench.
//!
//! ```bash
//! # probe every instrument listed in instruments.toml
//! modsweep find
//!
//! # calibrate LO delivery loss, then measure the +25 profile
//! modsweep calibrate --kind lo
//! modsweep measure --profile +25 --capture-template
//!
//! # replay a recorded fixture instead of using the bench
//! modsweep --simulate fixture.json measure --profile -60
//! ```
//!
//! Ctrl-C cancels the running job. The instruments are returned to a safe state before exit.

use std::{
    path::{ Path, PathBuf },
    process::ExitCode,
    time::Duration,
};
use anyhow::{ Context, Result };
use clap::{ Parser, Subcommand, ValueEnum };
use serde::Deserialize;
use tracing::{ error, info, warn };
use tracing_subscriber::EnvFilter;

use modsweep::{
    instrument::Instrument,
    replay::{ self, Fixture, Journal },
    BusInstrument, CalibrationKind, CancelToken, Controller, InstrumentSet, Job, Role, RunOutcome,
    SecondaryParameters,
};

/// Exit status of a run stopped with Ctrl-C
const EXIT_CANCELLED: u8 = 130;

/// modsweep - modulator calibration and characterization sweeps
#[derive(Parser)]
#[command(name = "modsweep")]
#[command(author, version, about, long_about = None)]
struct Cli
{
    /// Verbosity level (-v for debug, -vv for trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Directory holding calibration tables, adjustment templates and results
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// Secondary parameters (defaults to <DATA_DIR>/params.toml, written with defaults if missing)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Instrument addresses (defaults to <DATA_DIR>/instruments.toml)
    #[arg(long)]
    instruments: Option<PathBuf>,

    /// Replay a JSON fixture instead of connecting to the bench
    #[arg(long, value_name = "FIXTURE")]
    simulate: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands
{
    /// Probe every instrument and print its status
    Find,

    /// Reset every instrument and confirm the device is present
    Check
    {
        #[arg(long, default_value = "+25")]
        profile: String,
    },

    /// Run a calibration and save its table
    Calibrate
    {
        #[arg(long, value_enum, default_value = "lo")]
        kind: KindArg,
    },

    /// Run a measurement sweep and export its records
    Measure
    {
        #[arg(long, default_value = "+25")]
        profile: String,

        /// Save this run as the profile's adjustment baseline if it has none
        #[arg(long)]
        capture_template: bool,

        /// Export records here instead of the profile's result file
        #[arg(long, value_name = "FILE")]
        export: Option<PathBuf>,

        /// Also write the raw points as JSON
        #[arg(long, value_name = "FILE")]
        raw_out: Option<PathBuf>,

        /// Delete the profile's adjustment template before measuring
        #[arg(long)]
        invalidate_template: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindArg
{
    /// LO delivery loss
    Lo,
    /// RF path (empty table)
    Rf,
}

impl From<KindArg> for CalibrationKind
{
    fn from(arg: KindArg) -> Self
    {
        match arg {
            KindArg::Lo => CalibrationKind::Lo,
            KindArg::Rf => CalibrationKind::Rf,
        }
    }
}

/// `host:port` of each instrument's raw socket
#[derive(Debug, Deserialize)]
struct InstrumentAddrs
{
    lo: String,
    modulator: String,
    supply: String,
    meter: String,
    analyzer: String,
    /// Per-query reply timeout
    #[serde(default)]
    reply_timeout_ms: Option<u64>,
}

impl InstrumentAddrs
{
    fn load(path: &Path) -> Result<Self>
    {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading instrument addresses from {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    fn addr(&self, role: Role) -> &str
    {
        match role {
            Role::Lo => &self.lo,
            Role::Modulator => &self.modulator,
            Role::Supply => &self.supply,
            Role::Meter => &self.meter,
            Role::Analyzer => &self.analyzer,
        }
    }
}

async fn open_bench(addrs: &InstrumentAddrs) -> Result<InstrumentSet>
{
    let reply_timeout = addrs
        .reply_timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(BusInstrument::<tokio::net::TcpStream>::DEFAULT_TIMEOUT);

    let mut handles: Vec<Box<dyn Instrument>> = Vec::with_capacity(Role::ALL.len());
    for role in Role::ALL {
        let addr = addrs.addr(role);
        let stream = tokio::net::TcpStream::connect(addr)
            .await
            .with_context(|| format!("connecting to {} at {}", role, addr))?;
        handles.push(Box::new(BusInstrument::with(role.key(), stream).reply_timeout(reply_timeout)));
    }

    let mut handles = handles.into_iter();
    let mut next = || handles.next().context("instrument handle missing");
    Ok(InstrumentSet::with(next()?, next()?, next()?, next()?, next()?))
}

fn print_status(controller: &Controller, found: bool) -> RunOutcome
{
    for (role, status) in controller.status() {
        println!("{:<22}{}", role.to_string(), if status { "found" } else { "not found" });
    }

    if found {
        RunOutcome::Completed
    }
    else {
        RunOutcome::Failed(modsweep::Error::NotConnected(controller.missing()))
    }
}

fn init_logging(verbose: u8)
{
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();
}

/// Cancel `token` on the first Ctrl-C
fn cancel_on_ctrl_c(token: CancelToken)
{
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            token.cancel();
        }
    });
}

async fn run(cli: Cli) -> Result<RunOutcome>
{
    std::fs::create_dir_all(&cli.data_dir)
        .with_context(|| format!("creating {}", cli.data_dir.display()))?;

    let config = cli.config.clone().unwrap_or_else(|| cli.data_dir.join("params.toml"));
    let params = SecondaryParameters::load(&config)
        .with_context(|| format!("loading parameters from {}", config.display()))?;
    if !config.exists() {
        params.save(&config).with_context(|| format!("writing default parameters to {}", config.display()))?;
        info!(path = %config.display(), "default parameters written");
    }

    let bench = match &cli.simulate {
        Some(fixture) => {
            info!(fixture = %fixture.display(), "simulating bench");
            replay::bench(&Fixture::load(fixture)?, &Journal::default())
        }
        None => {
            let path = cli.instruments.clone().unwrap_or_else(|| cli.data_dir.join("instruments.toml"));
            open_bench(&InstrumentAddrs::load(&path)?).await?
        }
    };

    let mut controller = Controller::with(bench, &cli.data_dir)?;
    let found = controller.connect().await;

    let job = match &cli.command {
        Commands::Find => return Ok(print_status(&controller, found)),
        Commands::Check { profile } => Job::Check { profile: profile.clone(), params: params },
        Commands::Calibrate { kind } => Job::Calibrate { kind: (*kind).into(), params: params },
        Commands::Measure { profile, invalidate_template, .. } => {
            if *invalidate_template {
                controller.invalidate_template(profile)?;
            }
            Job::Measure { profile: profile.clone(), params: params }
        }
    };

    let results = controller.results();
    let worker = modsweep::spawn_worker(controller);
    let token = CancelToken::new();
    cancel_on_ctrl_c(token.clone());

    let outcome = worker
        .submit(job, token)
        .await
        .await
        .context("worker stopped before reporting")?;
    let controller = worker.shutdown().await.context("worker panicked")?;

    if let (RunOutcome::Completed, Commands::Measure { profile, capture_template, export, raw_out, .. }) =
        (&outcome, &cli.command)
    {
        let applied = results
            .lock()
            .map_err(|_| anyhow::anyhow!("result log poisoned"))?
            .adjustment()
            .map(|template| template.len());
        if let Some(entries) = applied {
            info!(%profile, entries, "adjustment template applied");
        }

        if *capture_template && controller.capture_template()? {
            info!(%profile, "adjustment template captured");
        }
        let path = match export {
            Some(path) => path.clone(),
            None => controller.result_path(profile)?,
        };

        let results = results.lock().map_err(|_| anyhow::anyhow!("result log poisoned"))?;
        if let Some(report) = results.report() {
            println!("{}", report);
        }
        results.export_csv(&path)?;
        println!("records written to {}", path.display());

        if let Some(raw_out) = raw_out {
            results.dump_raw(raw_out)?;
        }
    }

    Ok(outcome)
}

#[tokio::main]
async fn main() -> ExitCode
{
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(RunOutcome::Completed) => ExitCode::SUCCESS,
        Ok(RunOutcome::Cancelled) => {
            warn!("run cancelled");
            ExitCode::from(EXIT_CANCELLED)
        }
        Ok(RunOutcome::Failed(err)) => {
            error!("run failed: {}", err);
            ExitCode::FAILURE
        }
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}
