//! TraX client CLI binary.
//!
//! Drive an external visual object tracker over the TraX protocol.
//!
//! # Commands
//!
//! - `parse` - Dump the frames found in a captured protocol stream
//! - `handshake` - Start a tracker and print its capabilities
//! - `run` - Track a region through a sequence of images

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use trax::{
    config::Config,
    protocol::MessageReader,
    transport::{self, LogMode, ProcessSession},
    Capabilities, Image, Properties, Region, TrackerProcess, TrackerStatus, VERSION,
};

#[derive(Parser)]
#[command(name = "trax")]
#[command(version = VERSION)]
#[command(about = "TraX protocol client - drive external visual object trackers", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every protocol frame found in a captured stream
    Parse {
        /// Input file (default: stdin)
        file: Option<PathBuf>,

        /// Output as JSON, one message per line
        #[arg(long)]
        json: bool,
    },

    /// Start a tracker and print the negotiated capabilities
    Handshake {
        #[command(flatten)]
        tracker: TrackerArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Track a region through a sequence of images
    Run {
        #[command(flatten)]
        tracker: TrackerArgs,

        /// Ground-truth region on the first image (x,y,w,h or x1,y1,x2,y2,...)
        #[arg(short, long)]
        region: String,

        /// Images, first one used for initialization
        #[arg(short, long, num_args = 1.., required = true)]
        image: Vec<String>,

        /// Extra property sent with initialization (key=value)
        #[arg(short = 'p', long = "property", value_parser = parse_property)]
        properties: Vec<(String, String)>,

        /// Output as JSON, one status per line
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct TrackerArgs {
    /// Tracker command line (overrides config and TRAX_TRACKER)
    #[arg(short, long)]
    tracker: Option<String>,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Protocol log mode (none, incoming, outgoing, all)
    #[arg(long)]
    log_mode: Option<LogMode>,

    /// Protocol log file (default: stderr)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl TrackerArgs {
    fn resolve(self) -> anyhow::Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(line) = self.tracker {
            config.tracker = config.tracker.with_command_line(&line);
        }
        if let Some(mode) = self.log_mode {
            config.logging.mode = mode;
        }
        if self.log_file.is_some() {
            config.logging.file = self.log_file;
        }
        if config.tracker.command.is_none() {
            anyhow::bail!("No tracker configured. Use --tracker, TRAX_TRACKER or a config file");
        }
        Ok(config)
    }
}

fn parse_property(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Expected key=value, got {s:?}"))?;
    if !trax::protocol::is_valid_key(key) {
        return Err(format!("Invalid property key: {key:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Parse { file, json } => cmd_parse(file, json),

        Commands::Handshake { tracker, json } => cmd_handshake(tracker, json),

        Commands::Run {
            tracker,
            region,
            image,
            properties,
            json,
        } => cmd_run(tracker, &region, &image, properties, json),
    }
}

fn init_logging(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    // stdout carries command output, logs go to stderr
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn cmd_parse(file: Option<PathBuf>, json: bool) -> anyhow::Result<()> {
    let input: Box<dyn Read> = match file {
        Some(ref path) => Box::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        ),
        None => Box::new(io::stdin()),
    };

    let mut count = 0usize;
    for message in MessageReader::new(BufReader::new(input)) {
        let message = message?;
        if json {
            println!("{}", serde_json::to_string(&message)?);
        } else {
            println!("{message}");
        }
        count += 1;
    }

    tracing::info!(frames = count, "parse complete");
    Ok(())
}

#[derive(Serialize)]
struct HandshakeReport<'a> {
    pid: Option<u32>,
    capabilities: &'a Capabilities,
}

fn cmd_handshake(tracker: TrackerArgs, json: bool) -> anyhow::Result<()> {
    let config = tracker.resolve()?;
    let (process, mut session) = transport::spawn_session(&config)?;

    let caps = session.capabilities();
    if json {
        let report = HandshakeReport {
            pid: process.id(),
            capabilities: caps,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Tracker:    {}", caps.name.as_deref().unwrap_or("(unnamed)"));
        println!("Identifier: {}", caps.identifier.as_deref().unwrap_or("-"));
        println!("Version:    {}", caps.version);
        println!("Regions:    {}", join(caps.regions.iter()));
        println!("Images:     {}", join(caps.images.iter()));
    }

    finish(process, session)
}

fn cmd_run(
    tracker: TrackerArgs,
    region: &str,
    images: &[String],
    properties: Vec<(String, String)>,
    json: bool,
) -> anyhow::Result<()> {
    let region =
        Region::parse(region).ok_or_else(|| anyhow::anyhow!("Invalid region: {region:?}"))?;
    let images = images
        .iter()
        .map(|text| Image::parse(text).ok_or_else(|| anyhow::anyhow!("Invalid image: {text:?}")))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let properties: Properties = properties.into_iter().collect();

    let config = tracker.resolve()?;
    let (process, mut session) = transport::spawn_session(&config)?;

    let (first, rest) = images
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("At least one image is required"))?;

    let status = session.initialize(first, &region, &properties)?;
    print_status(0, &status, json)?;
    for (index, image) in rest.iter().enumerate() {
        let status = session.frame(image, &Properties::new())?;
        print_status(index + 1, &status, json)?;
    }

    finish(process, session)
}

fn finish(process: TrackerProcess, session: ProcessSession) -> anyhow::Result<()> {
    let pid = process.id();
    match transport::finish_session(process, session, transport::DEFAULT_SHUTDOWN_GRACE)? {
        Some(status) if !status.success() => {
            tracing::warn!(?pid, %status, "tracker exited with failure");
        },
        Some(status) => tracing::debug!(?pid, %status, "tracker exited"),
        None => tracing::warn!(?pid, "tracker was killed"),
    }
    Ok(())
}

fn print_status(index: usize, status: &TrackerStatus, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(status)?);
    } else {
        match status.region {
            Some(ref region) => println!("{index}\t{region}"),
            None => println!("{index}\t-"),
        }
    }
    Ok(())
}

fn join<T: ToString>(items: impl Iterator<Item = T>) -> String {
    let names: Vec<String> = items.map(|item| item.to_string()).collect();
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}
