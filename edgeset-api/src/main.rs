//! # EdgeSet Node
//!
//! Serves the host protocol over stdio or a TCP socket.
//!
//! Run with: `cargo run --bin edgeset-node -- serve --flash-image ./flash.img`
//!
//! Logs go to stderr; stdout carries the protocol.

use std::io::{self, BufReader};
use std::net::TcpListener;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use edgeset_api::{Dispatcher, EdgeNode, Session, StreamChannel};
use edgeset_core::config::{FailurePolicy, LogFormat, LoggingConfig};
use edgeset_core::Config;
use edgeset_storage::{FileFlash, MemoryFlash, PersistentDevice};

#[derive(Parser)]
#[command(name = "edgeset-node")]
#[command(about = "EdgeSet - on-device incremental learning over tiered example storage")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve host requests
    Serve(ServeArgs),
    /// Print the effective configuration as JSON
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct ServeArgs {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Flash image backing the persistent tier (in-memory when omitted)
    #[arg(long)]
    flash_image: Option<PathBuf>,

    /// Accept TCP connections here instead of serving stdin/stdout
    #[arg(long)]
    listen: Option<String>,

    /// Initial sampling seed
    #[arg(long)]
    seed: Option<u64>,

    /// trace, debug, info, warn or error
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Keep serving after a failed request
    #[arg(long)]
    continue_on_error: bool,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(Config::default()),
    }
}

fn init_logging(logging: &LoggingConfig, override_level: Option<&str>) {
    let level = override_level.unwrap_or(logging.level.as_str());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn open_device(config: &Config, flash_image: Option<&PathBuf>) -> Result<Box<dyn PersistentDevice>> {
    Ok(match flash_image {
        Some(path) => {
            info!("Persistent tier backed by {}", path.display());
            Box::new(FileFlash::open(path, &config.geometry)?)
        }
        None => {
            info!("Persistent tier held in memory; contents are lost on exit");
            Box::new(MemoryFlash::for_geometry(&config.geometry))
        }
    })
}

fn serve(args: ServeArgs) -> Result<()> {
    let mut config = load_config(args.config.as_ref())?;
    if let Some(seed) = args.seed {
        config.sampling.seed = seed;
    }
    if args.continue_on_error {
        config.protocol.on_error = FailurePolicy::Continue;
    }
    if args.log_json {
        config.logging.format = LogFormat::Json;
    }
    init_logging(&config.logging, args.log_level.as_deref());
    config.validate()?;

    info!("edgeset-node {} starting", edgeset_core::VERSION);

    let device = open_device(&config, args.flash_image.as_ref())?;
    let node = EdgeNode::new(config, device)?;
    let mut dispatcher = Dispatcher::new(node);

    match args.listen {
        Some(addr) => {
            let listener = TcpListener::bind(&addr).with_context(|| format!("binding {}", addr))?;
            info!("Listening on {}", addr);

            // One host at a time
            for stream in listener.incoming() {
                let stream = stream?;
                let peer = stream.peer_addr().ok();
                info!("Host connected: {:?}", peer);

                let reader = BufReader::new(stream.try_clone()?);
                let mut channel = StreamChannel::new(reader, stream);
                let stats = Session::new(&mut dispatcher).serve(&mut channel)?;
                info!("Host {:?} disconnected after {} requests", peer, stats.completed);
            }
        }
        None => {
            let stdin = io::stdin();
            let stdout = io::stdout();
            let mut channel = StreamChannel::new(stdin.lock(), stdout.lock());
            Session::new(&mut dispatcher).serve(&mut channel)?;
        }
    }

    dispatcher.into_node().into_store().sync()?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            let result = serve(args);
            if let Err(e) = &result {
                error!("edgeset-node stopped: {:#}", e);
            }
            result
        }
        Commands::Config { config } => {
            let config = load_config(config.as_ref())?;
            println!("{}", config.to_json_pretty()?);
            Ok(())
        }
    }
}
