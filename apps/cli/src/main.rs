use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use s3flash_core::{
    BaudRate, ConnectionParams, FlashError, FlashEvent, FlashObserver,
    FlashOrchestrator, FlasherConfig, SerialDevice, TracingObserver,
};
use tracing::{error, info, warn};

const EXIT_FAILURE: i32 = 1;
const EXIT_CANCELLED: i32 = 130;

#[derive(Parser, Debug)]
#[command(author, version, about = "ESP32-S3 firmware flasher (esptool front-end)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List serial ports and mark the likely target
    List {
        /// Config file providing device keywords
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Re-enumerate serial ports periodically and report changes
    Watch {
        /// Seconds between scans
        #[arg(long, default_value_t = 5)]
        interval: u64,

        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Flash bootloader, partition table and firmware
    Flash {
        /// Serial port (defaults to the guessed target)
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate: 115200, 460800 or 921600
        #[arg(short, long)]
        baud: Option<BaudRate>,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory containing bootloader.bin, partitions.bin and firmware.bin
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Bootloader offset, e.g. 0x0 (ESP32-S3) or 0x1000 (ESP32)
        #[arg(long, value_parser = parse_address)]
        bootloader_addr: Option<u32>,

        /// Flash tool executable
        #[arg(long)]
        tool: Option<String>,
    },
    /// Write a default configuration file
    InitConfig {
        file: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn parse_address(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid address '{s}': {e}"))
}

fn load_config(path: Option<&Path>) -> Result<FlasherConfig> {
    match path {
        Some(path) => FlasherConfig::load_from_file(path),
        None => Ok(FlasherConfig::default()),
    }
}

fn main() {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if cli.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let result = match cli.command {
        Commands::List { config } => list(config.as_deref()),
        Commands::Watch { interval, config } => watch(interval, config.as_deref()),
        Commands::Flash {
            port,
            baud,
            config,
            dir,
            bootloader_addr,
            tool,
        } => flash(port, baud, config.as_deref(), dir, bootloader_addr, tool),
        Commands::InitConfig { file, force } => init_config(&file, force),
    };

    match result {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("Error: {:#}", e);
            std::process::exit(EXIT_FAILURE);
        }
    }
}

fn list(config: Option<&Path>) -> Result<i32> {
    let catalog = load_config(config)?.catalog();
    let devices = catalog.list();
    if devices.is_empty() {
        println!("No serial ports found");
        return Ok(0);
    }

    let target = catalog.guess_target(&devices);
    for device in &devices {
        let marker = if Some(device) == target { "*" } else { " " };
        println!("{marker} {device}");
    }
    Ok(0)
}

fn watch(interval: u64, config: Option<&Path>) -> Result<i32> {
    let catalog = load_config(config)?.catalog();
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
        .context("installing Ctrl-C handler")?;

    let interval = Duration::from_secs(interval.max(1));
    let mut known: HashSet<SerialDevice> = HashSet::new();
    let mut target: Option<SerialDevice> = None;
    info!(interval_secs = interval.as_secs(), "Watching serial ports, Ctrl-C to stop");

    while running.load(Ordering::SeqCst) {
        let devices = catalog.list();
        let current: HashSet<SerialDevice> = devices.iter().cloned().collect();

        for device in current.difference(&known) {
            println!("+ {device}");
        }
        for device in known.difference(&current) {
            println!("- {device}");
        }

        let guessed = catalog.guess_target(&devices).cloned();
        if guessed != target {
            match &guessed {
                Some(device) => println!("target: {}", device.identifier),
                None => println!("target: none"),
            }
            target = guessed;
        }
        known = current;

        let deadline = Instant::now() + interval;
        while running.load(Ordering::SeqCst) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(100));
        }
    }
    Ok(0)
}

fn flash(
    port: Option<String>,
    baud: Option<BaudRate>,
    config: Option<&Path>,
    dir: Option<PathBuf>,
    bootloader_addr: Option<u32>,
    tool: Option<String>,
) -> Result<i32> {
    let mut config = load_config(config)?;
    if let Some(dir) = dir {
        config.base_dir = Some(dir);
    }
    if let Some(address) = bootloader_addr {
        config.bootloader_address = Some(address);
    }
    if let Some(program) = tool {
        config.tool.program = program;
    }
    let baud = baud.unwrap_or(config.baud);
    let plan = config.plan()?;

    let port = match port {
        Some(port) => port,
        None => {
            let catalog = config.catalog();
            let devices = catalog.list();
            match catalog.select(&devices) {
                Some(device) => {
                    info!(port = %device.identifier, "Using {}", device.description);
                    device.identifier.clone()
                }
                None => bail!("No serial device found; connect the board or pass --port"),
            }
        }
    };

    for entry in plan.entries() {
        info!("{}", entry);
    }

    let orchestrator = FlashOrchestrator::new(config.tool.clone());
    let handle = orchestrator.flash(ConnectionParams::new(port, baud), plan)?;

    let token = handle.cancel_token();
    ctrlc::set_handler(move || {
        eprintln!("Cancelling flash...");
        token.cancel();
    })
    .context("installing Ctrl-C handler")?;

    let logger = TracingObserver;
    for event in handle.events() {
        match event {
            FlashEvent::Progress(p) => println!("[{:>3}%] {}: {}", p.percent, p.phase, p.message),
            FlashEvent::Finished(_) => break,
            other => logger.on_event(&other),
        }
    }

    match handle.wait() {
        Ok(()) => {
            info!("Flash complete");
            Ok(0)
        }
        Err(FlashError::Cancelled) => {
            warn!("Re-flash the board before using it");
            Ok(EXIT_CANCELLED)
        }
        Err(e) => {
            error!("{}", e);
            Ok(EXIT_FAILURE)
        }
    }
}

fn init_config(file: &Path, force: bool) -> Result<i32> {
    if file.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", file.display());
    }
    let config = FlasherConfig {
        bootloader_address: Some(0x0),
        ..Default::default()
    };
    config.save_to_file(file)?;
    info!(path = %file.display(), "Wrote default configuration");
    Ok(0)
}
