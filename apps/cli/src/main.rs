use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use k5dump_core::events::{DumpEvent, DumpObserver, TracingObserver};
use k5dump_core::region::Region;
use k5dump_core::session::{DumpOutcome, DumpSession, SessionConfig};
use k5dump_core::transport::SerialTransport;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "UV-K5 EEPROM dump tool", long_about = None)]
struct Args {
    /// Serial port the programming cable is on (e.g. /dev/ttyUSB0, COM3)
    #[arg(short, long)]
    port: Option<String>,

    /// EEPROM region: config, calib or all
    #[arg(short, long)]
    region: Option<Region>,

    /// Output file (default: eeprom-<region>.bin)
    #[arg(short, long)]
    output: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Load settings from a TOML file; flags override it
    #[arg(short, long)]
    config: Option<String>,

    /// Skip CRC checks on received frames
    #[arg(long)]
    no_crc: bool,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Logs through tracing and draws a percentage line on stderr.
struct ProgressObserver {
    inner: TracingObserver,
    last_percent: AtomicU32,
}

impl ProgressObserver {
    fn new() -> Self {
        Self {
            inner: TracingObserver,
            last_percent: AtomicU32::new(u32::MAX),
        }
    }
}

impl DumpObserver for ProgressObserver {
    fn on_event(&self, event: &DumpEvent) {
        self.inner.on_event(event);
        match event {
            DumpEvent::Progress { percent, .. } => {
                if self.last_percent.swap(*percent, Ordering::Relaxed) != *percent {
                    eprint!("\rFetching data.. {percent:3}%");
                    let _ = std::io::stderr().flush();
                }
            }
            DumpEvent::Complete { .. } => eprintln!(),
            _ => {}
        }
    }
}

fn build_config(args: &Args) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {path}"))?,
        None => SessionConfig::default(),
    };

    if let Some(port) = &args.port {
        config.port = Some(port.clone());
    }
    if let Some(region) = args.region {
        config.region = region;
    }
    if let Some(output) = &args.output {
        config.output_path = Some(output.clone());
    }
    if let Some(baud) = args.baud {
        config.baud_rate = baud;
    }
    if args.no_crc {
        config.verify_crc = false;
    }
    Ok(config)
}

fn list_ports() -> Result<()> {
    let ports = SerialTransport::available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{}\t{}", port.name, port.description);
    }
    Ok(())
}

/// Returns the process exit code: 0 dumped, 2 access rejected.
fn run(args: &Args) -> Result<i32> {
    if args.list_ports {
        list_ports()?;
        return Ok(0);
    }

    let config = build_config(args)?;
    let session = DumpSession::with_observer(config, Arc::new(ProgressObserver::new()));
    let config = session.config();
    let output = config.output_path();
    info!(
        port = config.port.as_deref().unwrap_or("-"),
        region = %config.region,
        output = %output.display(),
        "Starting k5dump..."
    );

    match session.run_serial()? {
        DumpOutcome::Written { bytes } => {
            info!(bytes, path = %output.display(), "EEPROM saved");
            Ok(0)
        }
        DumpOutcome::AccessRejected { error_code } => {
            error!(code = error_code, "Radio refused access, nothing written");
            Ok(2)
        }
    }
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    match run(&args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
