use anyhow::Context;
use clap::{Parser, Subcommand};
use fmcwcore::analysis::{analyze, latest_log, load_log};
use fmcwcore::config::{compile, read_config_file};
use fmcwcore::pipeline::LogFormat;
use fmcwcore::port::{available_ports, PortController};
use fmcwcore::protocol::ResyncPolicy;
use generator::{SensorProfile, SimulatedSensor};
use log::info;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::{Session, WorkflowConfig};

mod generator;
mod gui_bridge;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Serial capture driver for FMCW radar sensors")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    /// Serial device the sensor is attached to
    #[arg(long)]
    port: Option<String>,
    /// Sensor command file to upload before streaming
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    initial_baud: Option<u32>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// json-array or json-lines
    #[arg(long, value_parser = parse_log_format)]
    log_format: Option<LogFormat>,
    /// Stream from an in-process simulated sensor instead of a serial port
    #[arg(long, default_value_t = false)]
    simulate: bool,
    #[arg(long)]
    seed: Option<u64>,
    /// Serve frame snapshots over HTTP (default 127.0.0.1:9000)
    #[arg(long, num_args = 0..=1, default_missing_value = "127.0.0.1:9000")]
    serve: Option<SocketAddr>,
    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(long)]
    duration: Option<f64>,
    /// Re-examine bytes read after a false sync start
    #[arg(long, default_value_t = false)]
    rescan: bool,
    /// Print the serial ports found on this machine and exit
    #[arg(long, default_value_t = false)]
    list_ports: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Report missed frames and frame timing for a frame log
    Analyze {
        /// Log to analyse; defaults to the newest fHist_* file in the output directory
        file: Option<PathBuf>,
    },
    /// Compile a sensor command file and print the derived parameters
    Compile { config: PathBuf },
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    match value {
        "json-array" => Ok(LogFormat::JsonArray),
        "json-lines" => Ok(LogFormat::JsonLines),
        other => Err(format!("unknown log format `{other}` (json-array, json-lines)")),
    }
}

fn apply_overrides(config: &mut WorkflowConfig, args: &Args) {
    if let Some(port) = &args.port {
        config.port = Some(port.clone());
    }
    if let Some(path) = &args.config {
        config.radar_config = Some(path.clone());
    }
    if let Some(baud) = args.initial_baud {
        config.initial_baud = baud;
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(format) = args.log_format {
        config.log_format = format;
    }
    if args.simulate {
        config.simulate = true;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if args.serve.is_some() {
        config.gui_bind = args.serve;
    }
    if args.duration.is_some() {
        config.duration_secs = args.duration;
    }
    if args.rescan {
        config.resync = ResyncPolicy::Rescan;
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut workflow_config = if let Some(path) = &args.workflow {
        WorkflowConfig::load(path)?
    } else {
        WorkflowConfig::from_args(args.port.clone(), args.config.clone())
    };
    apply_overrides(&mut workflow_config, &args);

    if args.list_ports {
        let ports = available_ports().context("listing serial ports")?;
        if ports.is_empty() {
            println!("No serial ports found.");
        }
        for port in ports {
            println!("{port}");
        }
        return Ok(());
    }

    match &args.command {
        Some(Command::Analyze { file }) => {
            return analyze_log(file.clone(), &workflow_config.output_dir)
        }
        Some(Command::Compile { config }) => return print_compiled(config),
        None => {}
    }

    let session = Session::new(workflow_config.clone());
    let commands = session.load_commands()?;
    let params = session.compile(&commands)?;

    let running = if workflow_config.simulate {
        let profile = SensorProfile {
            read_timeout_ms: workflow_config.read_timeout_ms,
            ..SensorProfile::seeded(workflow_config.seed)
        };
        info!("Streaming from simulated sensor (seed {})", profile.seed);
        session.start(SimulatedSensor::new(profile), &commands, params)?
    } else {
        let port_id = workflow_config
            .port
            .as_deref()
            .context("no serial port given (use --port, or --list-ports to find one)")?;
        let port = PortController::open(port_id, &workflow_config.to_port_settings())
            .with_context(|| format!("opening serial port {port_id}"))?;
        session.start(port, &commands, params)?
    };
    info!("Capturing to {}", running.log_path().display());
    if let Some(addr) = running.gui_addr() {
        println!("Frame snapshots at http://{addr}/frame, metrics at http://{addr}/stats");
    }

    wait_for_shutdown(workflow_config.duration())?;
    let summary = running.finish()?;

    println!(
        "Capture finished -> frames {}, logged {}, timeouts {}, discarded bytes {}, decode errors {}, dropped {}",
        summary.acquisition.frames,
        summary.frames_logged,
        summary.acquisition.timeouts,
        summary.acquisition.discarded_bytes,
        summary.acquisition.decode_errors,
        summary.acquisition.sink_drops
    );
    println!("Frame log: {}", summary.log_path.display());
    Ok(())
}

fn wait_for_shutdown(limit: Option<Duration>) -> anyhow::Result<()> {
    let runtime = TokioBuilder::new_current_thread()
        .enable_all()
        .build()
        .context("creating runtime for signal handling")?;
    runtime.block_on(async {
        match limit {
            Some(limit) => tokio::select! {
                result = signal::ctrl_c() => result.context("awaiting Ctrl+C to exit")?,
                _ = tokio::time::sleep(limit) => info!("Capture duration elapsed"),
            },
            None => signal::ctrl_c().await.context("awaiting Ctrl+C to exit")?,
        }
        Ok::<(), anyhow::Error>(())
    })
}

fn analyze_log(file: Option<PathBuf>, output_dir: &Path) -> anyhow::Result<()> {
    let path = match file {
        Some(path) => path,
        None => latest_log(output_dir)
            .with_context(|| format!("no fHist_* logs found in {}", output_dir.display()))?,
    };
    println!("Analyzing log file: {}", path.display());
    let frames = load_log(&path).with_context(|| format!("reading frame log {}", path.display()))?;
    let report = analyze(&frames).with_context(|| format!("analysing {}", path.display()))?;
    println!("{report}");
    Ok(())
}

fn print_compiled(path: &Path) -> anyhow::Result<()> {
    let commands = read_config_file(path)
        .with_context(|| format!("loading sensor config {}", path.display()))?;
    let params = compile(&commands).with_context(|| format!("compiling {}", path.display()))?;
    println!("{}", serde_json::to_string_pretty(&params)?);
    Ok(())
}
