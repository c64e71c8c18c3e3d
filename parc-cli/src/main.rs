//! Receiver control CLI.
//!
//! ```text
//! parc status                      Power status
//! parc on [--no-wait]              Power on (waits for warmup)
//! parc off [--no-wait]             Power off (waits for cooldown)
//! parc input hdmi_2                Switch input
//! parc model                       Model and firmware info
//! parc raw <name> [payload-hex]    Send any catalog command
//! parc discover [--json]           Find receivers on the network
//! ```
//!
//! The host is taken from `--host`, the `PARC_HOST` environment
//! variable, or the config file, in that order of priority. `dp://`
//! hosts are resolved via discovery.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use parc_core::client::{ClientConfig, ReceiverClient};
use parc_core::discovery::{search, SearchOptions};
use parc_core::protocol::catalog::name_to_meta;
use parc_core::protocol::command::Command;
use parc_core::protocol::packet::Packet;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "parc", about = "Control networked AV receivers", version)]
struct Cli {
    /// Host specifier: `host[:port]`, `tcp://host[:port]`, `dp://`,
    /// or `dp://<device name>`.
    #[arg(long, global = true)]
    host: Option<String>,

    /// TCP control port when the host specifier names none.
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Handshake password.
    #[arg(long, global = true)]
    password: Option<String>,

    /// Per-operation timeout in seconds.
    #[arg(long, global = true)]
    timeout: Option<f64>,

    /// Path to a JSON config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Power the receiver on, riding out warmup and cooldown.
    On {
        /// Return as soon as the receiver starts warming.
        #[arg(long)]
        no_wait: bool,
    },
    /// Power the receiver off.
    Off {
        /// Return as soon as the receiver starts cooling.
        #[arg(long)]
        no_wait: bool,
    },
    /// Print the current power status.
    Status,
    /// Switch input, e.g. `hdmi_1` or `hdmi_2`.
    Input { name: String },
    /// Print the receiver's model names and firmware version.
    Model,
    /// Send any catalog command by its full name, optionally with a
    /// replacement payload in hex.
    Raw {
        /// Full command name, e.g. `power_status.query`.
        name: String,
        /// Payload bytes as hex, replacing the catalog payload.
        payload_hex: Option<String>,
    },
    /// Search the local network for receivers.
    Discover {
        /// Only report receivers with this device name.
        #[arg(long)]
        name: Option<String>,
        /// Machine-readable JSON output.
        #[arg(long)]
        json: bool,
    },
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Cmd::Discover { name, json } = &cli.command {
        return discover(name.as_deref(), *json).await;
    }

    let config = build_config(&cli)?;
    let client = ReceiverClient::connect(config).await?;

    match cli.command {
        Cmd::On { no_wait } => {
            let status = client.power_on_wait(!no_wait).await?;
            println!("{status}");
        }
        Cmd::Off { no_wait } => {
            let status = client.power_off_wait(!no_wait).await?;
            println!("{status}");
        }
        Cmd::Status => {
            println!("{}", client.power_status().await?);
        }
        Cmd::Input { name } => {
            client.set_input(&name).await?;
            println!("{}", client.input_status().await?);
        }
        Cmd::Model => {
            println!("model: {}", client.model_status().await?);
            println!("firmware: {}", client.firmware_version().await?);
        }
        Cmd::Raw { name, payload_hex } => {
            let response = client.transact(raw_command(&name, payload_hex.as_deref())?).await?;
            match response.response_str() {
                Ok(text) => println!("{text}"),
                Err(_) => println!("{:02X?}", response.payload()),
            }
        }
        Cmd::Discover { .. } => unreachable!("handled above"),
    }

    client.shut_down().await;
    Ok(())
}

fn build_config(cli: &Cli) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    let mut config = ClientConfig::layered(cli.config.as_deref())?;
    if let Some(host) = &cli.host {
        config = config.with_host(host.clone());
    }
    if let Some(port) = cli.port {
        config = config.with_port(port);
    }
    if let Some(password) = &cli.password {
        config = config.with_password(Some(password.clone()));
    }
    if let Some(timeout) = cli.timeout {
        config = config.with_timeout(Duration::from_secs_f64(timeout));
    }
    config.validate()?;
    debug!(host = ?config.host, port = config.port, "resolved configuration");
    Ok(config)
}

fn raw_command(name: &str, payload_hex: Option<&str>) -> Result<Command, Box<dyn std::error::Error>> {
    let meta = name_to_meta(name)?;
    match payload_hex {
        None => Ok(Command::from_meta(meta)?),
        Some(hex) => {
            let payload = parse_hex(hex)?;
            let packet = Packet::synthesize(meta.packet_type(), meta.command_code(), &payload)?;
            Ok(Command { meta, packet })
        }
    }
}

fn parse_hex(hex: &str) -> Result<Vec<u8>, String> {
    let hex: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
    if hex.len() % 2 != 0 {
        return Err("hex payload must have an even number of digits".to_string());
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| format!("invalid hex byte {:?}", &hex[i..i + 2]))
        })
        .collect()
}

async fn discover(name: Option<&str>, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let found = search(&SearchOptions::for_name(name)).await?;
    if json {
        let entries: Vec<serde_json::Value> = found
            .iter()
            .map(|r| {
                serde_json::json!({
                    "device_name": r.device_name,
                    "model_name": r.model_name,
                    "serial_number": r.serial_number,
                    "tcp_addr": r.tcp_addr.to_string(),
                    "is_off": r.is_off,
                    "version": r.version,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if found.is_empty() {
        eprintln!("no receivers found");
        std::process::exit(1);
    }
    for r in &found {
        println!(
            "{}\t{}\t{}\t{}",
            r.device_name,
            r.model_name,
            r.tcp_addr,
            if r.is_off { "off" } else { "on" }
        );
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_payloads() {
        assert_eq!(parse_hex("30").unwrap(), vec![0x30]);
        assert_eq!(parse_hex("50 57 31").unwrap(), vec![0x50, 0x57, 0x31]);
        assert!(parse_hex("5").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn raw_command_with_payload_override() {
        let cmd = raw_command("power.on", None).unwrap();
        assert_eq!(cmd.name(), "power.on");

        let cmd = raw_command("power.on", Some("505731")).unwrap();
        assert_eq!(cmd.packet.payload(), &[0x50, 0x57, 0x31]);
    }

    #[test]
    fn cli_parses_subcommands() {
        use clap::Parser;
        let cli = Cli::try_parse_from(["parc", "--host", "dp://den", "on", "--no-wait"]).unwrap();
        assert_eq!(cli.host.as_deref(), Some("dp://den"));
        assert!(matches!(cli.command, Cmd::On { no_wait: true }));

        let cli = Cli::try_parse_from(["parc", "raw", "power_status.query"]).unwrap();
        assert!(matches!(cli.command, Cmd::Raw { .. }));
    }
}
