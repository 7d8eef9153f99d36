//! Terminal front end for a Miniscope MTF calibration run.
//!
//! ```bash
//! mtf_capture run --lps 23,40,57 --port /dev/ttyACM0 --power 128
//! mtf_capture run --lps 23,40 --scorer-cmd "python score_photo.py" --output results.csv
//! mtf_capture ports
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mtf_capture::config::{LoggingConfig, Settings};
use mtf_capture::export::{CsvExporter, ExportBridge};
use mtf_capture::feed::FrameFeed;
use mtf_capture::frame::FrameSource;
use mtf_capture::frame_store::FrameStore;
use mtf_capture::hardware::{available_ports, DirectorySource, SerialportOpener, SyntheticSource};
use mtf_capture::illumination::IlluminationController;
use mtf_capture::scorer::{CommandScorer, Scorer};
use mtf_capture::shell::{self, describe_error, OperatorCommand, HELP};
use mtf_capture::{CaptureSession, Lps};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Miniscope MTF calibration capture", long_about = None)]
struct Cli {
    /// Settings file (defaults to ./mtf_capture.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a capture session
    Run(RunArgs),
    /// List serial ports
    Ports,
    /// Print the LPS values that can be selected
    Options,
}

#[derive(Args)]
struct RunArgs {
    /// LPS targets in capture order, comma separated
    #[arg(short, long, value_delimiter = ',')]
    lps: Vec<Lps>,

    /// LED serial port to connect at start-up
    #[arg(short, long)]
    port: Option<String>,

    /// Initial LED power (0-255)
    #[arg(long)]
    power: Option<u8>,

    /// External scoring program, run with the saved image path appended
    #[arg(long)]
    scorer_cmd: Option<String>,

    /// Replay frames from this directory instead of the synthetic pattern
    #[arg(long)]
    frames: Option<PathBuf>,

    /// Results CSV (defaults to export.default_file_name)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Do not write captured images to disk
    #[arg(long)]
    no_store: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    init_tracing(&settings.logging);

    match cli.command {
        Commands::Run(args) => run(settings, args).await,
        Commands::Ports => {
            let ports = available_ports()?;
            if ports.is_empty() {
                println!("No COM ports");
            }
            for port in ports {
                println!("{port}");
            }
            Ok(())
        }
        Commands::Options => {
            let options: Vec<String> = settings
                .capture
                .lps_options
                .iter()
                .map(ToString::to_string)
                .collect();
            println!("{}", options.join(", "));
            Ok(())
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn frame_source(settings: &Settings, args: &RunArgs) -> Result<Box<dyn FrameSource>> {
    match args.frames.as_ref().or(settings.feed.frame_dir.as_ref()) {
        Some(dir) => Ok(Box::new(DirectorySource::open(dir)?)),
        None => {
            let (width, height) = settings.feed.synthetic_size;
            Ok(Box::new(SyntheticSource::new(width, height, 16)))
        }
    }
}

async fn run(settings: Settings, args: RunArgs) -> Result<()> {
    for lps in &args.lps {
        if !settings.capture.lps_options.contains(lps) {
            warn!(lps, "LPS value is not on the configured target menu");
        }
    }

    let feed = FrameFeed::new(frame_source(&settings, &args)?);
    let opener = SerialportOpener::new(settings.serial.baud_rate, settings.serial.write_timeout());
    let illumination = IlluminationController::new(Box::new(opener));
    let store = (!args.no_store).then(|| FrameStore::new(&settings.capture.image_dir));

    let mut session = CaptureSession::begin(args.lps.clone(), feed, illumination, store)
        .map_err(|err| anyhow::anyhow!(describe_error(&err)))?;

    if let Some(port) = &args.port {
        match session.connect(port) {
            Ok(()) => println!("Connected to {port}"),
            Err(err) => println!("{}", describe_error(&err)),
        }
    }
    if let Some(level) = args.power {
        if let Err(err) = session.set_power(level) {
            println!("{}", describe_error(&err));
        }
    }

    let mut scorer: Option<Box<dyn Scorer>> = match args
        .scorer_cmd
        .as_deref()
        .or(settings.capture.scorer_command.as_deref())
    {
        Some(line) => Some(Box::new(CommandScorer::from_command_line(line)?)),
        None => None,
    };

    let mut ticker = tokio::time::interval(settings.feed.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{HELP}");
    println!("{}", session.banner());

    while !session.is_complete() {
        tokio::select! {
            _ = ticker.tick() => {
                session.tick();
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read operator input")? else {
                    break;
                };
                let command = match line.parse::<OperatorCommand>() {
                    Ok(command) => command,
                    Err(shell::ParseCommandError::Empty) => continue,
                    Err(err) => {
                        println!("{err}");
                        continue;
                    }
                };
                // External scorers block until their process exits; the feed
                // does not tick meanwhile.
                let reply = tokio::task::block_in_place(|| match scorer.as_mut() {
                    Some(scorer) => shell::dispatch(&mut session, Some(scorer.as_mut()), command),
                    None => shell::dispatch(&mut session, None, command),
                });
                println!("{}", reply.message);
                if reply.quit {
                    if let Some(unsaved) = shell::unsaved_results(&session) {
                        println!("{unsaved}");
                    }
                    return Ok(());
                }
                println!("{}", session.banner());
            }
        }
    }

    if !session.is_complete() {
        info!("operator input closed before the sequence finished");
        if let Some(unsaved) = shell::unsaved_results(&session) {
            println!("{unsaved}");
        }
        return Ok(());
    }

    let mut output = args
        .output
        .unwrap_or_else(|| PathBuf::from(&settings.export.default_file_name));
    loop {
        let mut bridge = ExportBridge::new(Box::new(CsvExporter::new(Some(output.clone()))));
        let report = shell::export_results(&mut session, &mut bridge);
        println!("{}", report.message);
        if !report.retry {
            return Ok(());
        }
        error!(path = %output.display(), "results export failed");
        println!("Enter another path to retry the export, or a blank line to give up.");
        match lines.next_line().await.context("Failed to read operator input")? {
            Some(line) if !line.trim().is_empty() => output = PathBuf::from(line.trim()),
            _ => {
                println!("Results were not saved.");
                return Ok(());
            }
        }
    }
}
