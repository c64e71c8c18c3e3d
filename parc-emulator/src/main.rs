//! Receiver emulator daemon — entry point.
//!
//! ```text
//! parc-emulator                     Run with defaults (port 14999)
//! parc-emulator --port 0           Pick a free port
//! parc-emulator --advertise        Announce over discovery
//! parc-emulator --config <path>    Load a custom config TOML
//! parc-emulator --gen-config       Write default config to stdout
//! ```

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use parc_core::emulator::Emulator;

mod config;

use config::EmulatorConfig;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "parc-emulator", about = "Standalone AV receiver emulator", version)]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "parc-emulator.toml")]
    config: PathBuf,

    /// TCP control port (0 picks a free one).
    #[arg(long)]
    port: Option<u16>,

    /// Address to listen on.
    #[arg(long)]
    bind: Option<IpAddr>,

    /// Receiver model to emulate.
    #[arg(long)]
    model: Option<String>,

    /// Require this handshake password.
    #[arg(long)]
    password: Option<String>,

    /// Device name announced over discovery.
    #[arg(long)]
    device_name: Option<String>,

    /// Warmup time in seconds.
    #[arg(long)]
    warmup: Option<f64>,

    /// Cooldown time in seconds.
    #[arg(long)]
    cooldown: Option<f64>,

    /// Answer discovery searches and advertise.
    #[arg(long)]
    advertise: bool,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

impl Cli {
    fn apply(&self, config: &mut EmulatorConfig) {
        if let Some(port) = self.port {
            config.network.port = port;
        }
        if let Some(bind) = self.bind {
            config.network.bind = bind;
        }
        if let Some(model) = &self.model {
            config.receiver.model = model.clone();
        }
        if let Some(password) = &self.password {
            config.receiver.password = password.clone();
        }
        if let Some(device_name) = &self.device_name {
            config.discovery.device_name = device_name.clone();
        }
        if let Some(warmup) = self.warmup {
            config.receiver.warmup_secs = warmup;
        }
        if let Some(cooldown) = self.cooldown {
            config.receiver.cooldown_secs = cooldown;
        }
        if self.advertise {
            config.discovery.enabled = true;
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&EmulatorConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = EmulatorConfig::load(&cli.config);
    cli.apply(&mut config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("parc-emulator v{}", env!("CARGO_PKG_VERSION"));

    let mut emulator = Emulator::start(config.to_options()).await?;
    info!("listening on {}", emulator.local_addr());
    if config.discovery.enabled {
        info!("advertising as {:?}", config.discovery.device_name);
    }
    info!(
        "warmup {:.1}s, cooldown {:.1}s",
        config.receiver.warmup_secs, config.receiver.cooldown_secs
    );

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, shutting down");
    emulator.shut_down().await;

    Ok(())
}
