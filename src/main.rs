use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use color_eyre::Result;
use serde::Serialize;
use sysdeck::config::{Config, load_config, load_config_from_path};
use sysdeck::engine::Engine;
use sysdeck::report::StatsRequest;
use sysdeck::system::control::{ControlAction, ControlOutcome};

#[derive(Parser)]
#[command(
    name = "sysdeck",
    about = "Linux system metrics and process control"
)]
struct Cli {
    /// Path to config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Refresh rate in milliseconds
    #[arg(long, global = true)]
    refresh_rate: Option<u64>,

    /// procfs mount to sample from
    #[arg(long, global = true)]
    proc_root: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Host memory, swap, uptime, load and CPU usage
    Sysinfo,
    /// Per-core CPU usage in percent
    Cpu,
    /// Full process table
    Processes,
    /// Text report of the top processes
    Stats {
        #[command(flatten)]
        selection: Selection,
    },
    /// Restrict processes to a set of cores
    Bind {
        #[command(flatten)]
        target: Target,
        #[arg(short, long, required = true, value_delimiter = ',')]
        cores: Vec<usize>,
    },
    /// Send a signal (default SIGTERM)
    Kill {
        #[command(flatten)]
        target: Target,
        #[arg(short, long, default_value_t = 15)]
        signal: i32,
    },
    /// Set the nice value of processes
    Renice {
        #[command(flatten)]
        target: Target,
        #[arg(short = 'p', long, allow_negative_numbers = true)]
        nice: i32,
    },
    /// Process tree with subtree memory; pid 0 shows every root
    Tree {
        #[arg(default_value_t = 0)]
        pid: u32,
    },
    /// Disk and network throughput
    Io,
    /// Rolling CPU and memory history
    History,
    /// Stream one snapshot per refresh until Ctrl-C
    Watch,
}

/// Which rows of the process table to use, and in what order.
#[derive(Args)]
struct Selection {
    /// Number of rows; 0 selects nothing
    #[arg(short = 'n', long)]
    nprocs: Option<usize>,
    #[arg(long)]
    sort_by: Option<String>,
    /// Sort ascending instead of descending
    #[arg(long, default_value_t = false)]
    ascending: bool,
    /// name, user, state, pid or ppid
    #[arg(long, default_value = "")]
    filter_by: String,
    #[arg(long, default_value = "")]
    pattern: String,
    #[arg(long, default_value_t = false)]
    exact: bool,
}

impl Selection {
    fn request(self, config: &Config, default_nprocs: usize) -> StatsRequest {
        let defaults = config.stats_request();
        StatsRequest {
            nprocs: self.nprocs.unwrap_or(default_nprocs),
            sort_by: self.sort_by.unwrap_or(defaults.sort_by),
            descending: if self.ascending { false } else { defaults.descending },
            filter_by: self.filter_by,
            pattern: self.pattern,
            exact_match: self.exact,
        }
    }
}

/// A single pid, or every process matching a selection.
#[derive(Args)]
struct Target {
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    pid: Option<u32>,
    /// Act on every process matched by the selection flags
    #[arg(short = 'a', long, default_value_t = false)]
    all: bool,
    #[command(flatten)]
    selection: Selection,
}

#[derive(Serialize)]
struct OutcomeLine {
    pid: u32,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<&ControlOutcome> for OutcomeLine {
    fn from(outcome: &ControlOutcome) -> Self {
        OutcomeLine {
            pid: outcome.pid,
            ok: outcome.result.is_ok(),
            error: outcome.result.as_ref().err().map(ToString::to_string),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    sysdeck::logging::init(cli.log_json)?;
    let config = load_config_for_cli(&cli);

    let engine = Engine::start(&config).await?;
    let result = run(&engine, &config, cli.command).await;
    engine.shutdown().await;
    result
}

async fn run(engine: &Engine, config: &Config, command: Command) -> Result<()> {
    match command {
        Command::Sysinfo => println!("{}", engine.get_sysinfo_serialized()?),
        Command::Cpu => {
            wait_for_rates(engine).await?;
            print_json(&engine.get_cpu_usage())?;
        }
        Command::Io => {
            wait_for_rates(engine).await?;
            print_json(engine.get_io_stats().as_ref())?;
        }
        Command::History => {
            wait_for_rates(engine).await?;
            print_json(engine.get_usage_history().as_ref())?;
        }
        Command::Processes => print_json(engine.read_processes().as_ref())?,
        Command::Stats { selection } => {
            let request = selection.request(config, config.report.default_nprocs);
            print!("{}", engine.show_stats(&request));
        }
        Command::Bind { target, cores } => {
            let single = target.pid;
            control(engine, config, target, ControlAction::Affinity(cores))?;
            if let Some(pid) = single {
                print_json(&engine.get_affinity(pid)?)?;
            }
        }
        Command::Kill { target, signal } => {
            control(engine, config, target, ControlAction::Signal(signal))?
        }
        Command::Renice { target, nice } => {
            control(engine, config, target, ControlAction::Priority(nice))?
        }
        Command::Tree { pid } => print_json(&engine.build_tree(pid))?,
        Command::Watch => watch(engine).await?,
    }
    Ok(())
}

/// One pid fails the command on error. `--all` reports one JSON line per
/// selected pid and carries on past failures.
fn control(
    engine: &Engine,
    config: &Config,
    target: Target,
    action: ControlAction,
) -> Result<()> {
    if let (Some(pid), false) = (target.pid, target.all) {
        engine.execute(pid, &action)?;
        return Ok(());
    }
    let request = target.selection.request(config, usize::MAX);
    for outcome in engine.execute_on_matching(&request, &action) {
        print_json(&OutcomeLine::from(&outcome))?;
    }
    Ok(())
}

/// Rates need two samples; the first generation only carries a baseline.
async fn wait_for_rates(engine: &Engine) -> Result<()> {
    engine.invalidate();
    engine.wait_for_generation(2).await?;
    Ok(())
}

async fn watch(engine: &Engine) -> Result<()> {
    let mut updates = engine.subscribe();
    print_json(engine.get_sysinfo().as_ref())?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            published = updates.changed() => {
                print_json(published?.system.as_ref())?;
            }
        }
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn load_config_for_cli(cli: &Cli) -> Config {
    let mut config = match &cli.config {
        Some(path) => load_config_from_path(path),
        None => load_config(),
    };

    if let Some(rate) = cli.refresh_rate {
        config.general.refresh_rate_ms = rate;
    }
    if let Some(ref root) = cli.proc_root {
        config.procfs.root = root.clone();
    }

    config
}
