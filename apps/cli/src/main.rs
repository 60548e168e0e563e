use anyhow::{Context, Result, anyhow};
use clap::Parser;
use meshdfu_core::session::{DfuSession, SessionConfig};
use meshdfu_core::transport::{SerialTransport, available_ports};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "BLE Mesh DFU Tool", long_about = None)]
struct Args {
    /// Serial port of the mesh gateway (e.g. /dev/ttyACM0, COM12)
    #[arg(short, long)]
    port: Option<String>,

    /// Path to firmware binary (test-app.bin)
    #[arg(short, long)]
    firmware: Option<String>,

    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Serial baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// Response timeout in milliseconds (0 waits forever)
    #[arg(long)]
    timeout: Option<u64>,

    /// Application version being installed
    #[arg(long)]
    app_version: Option<u32>,

    /// Skip the radio reset before joining the mesh
    #[arg(long)]
    no_reset: bool,

    /// Write the effective configuration to this file and exit
    #[arg(long)]
    save_config: Option<String>,

    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Config file values, overridden by command line flags.
    fn session_config(&self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::load_from_file(path)
                .with_context(|| format!("Failed to load config {}", path))?,
            None => SessionConfig::default(),
        };
        if let Some(port) = &self.port {
            config.port = Some(port.clone());
        }
        if let Some(firmware) = &self.firmware {
            config.firmware_path = Some(firmware.clone());
        }
        if let Some(baud) = self.baud {
            config.baud_rate = baud;
        }
        if let Some(timeout) = self.timeout {
            config.response_timeout_ms = Some(timeout);
        }
        if let Some(app_version) = self.app_version {
            config.identity.app_version = app_version;
        }
        if self.no_reset {
            config.reset_radio = false;
        }
        Ok(config)
    }
}

fn run(args: &Args) -> Result<()> {
    if args.list_ports {
        for port in available_ports()? {
            println!("{}", port);
        }
        return Ok(());
    }

    let config = args.session_config()?;

    if let Some(path) = &args.save_config {
        config.save_to_file(path)?;
        info!(path = %path, "Configuration written");
        return Ok(());
    }

    let port = config
        .port
        .clone()
        .ok_or_else(|| anyhow!("No serial port given (use --port or set `port` in the config)"))?;
    let transport = SerialTransport::open(&port, config.baud_rate, config.response_timeout())?;

    let mut session = DfuSession::new(config, transport);
    let report = session.run()?;
    info!(
        state = %report.record.state,
        segments = report.segments_sent,
        messages = report.messages_sent,
        "Firmware update complete"
    );
    Ok(())
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

    info!("Starting meshdfu (serial backend)...");

    if let Err(e) = run(&args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}
