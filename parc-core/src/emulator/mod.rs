//! Receiver emulator.
//!
//! Listens on the control port and answers commands the way real
//! hardware does, including the awkward parts: `power.on` gets no
//! response at all unless the receiver is in Standby, and warmup and
//! cooldown take wall-clock time before the status settles.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::discovery::server::{DpServer, ServerOptions};
use crate::error::{ParcError, Result};
use crate::protocol::catalog::{name_to_meta, rank_candidates, resolve_command_packet, CommandMeta};
use crate::protocol::constants::DEFAULT_PORT;
use crate::protocol::model::{model_by_name, ReceiverModel, DEFAULT_EMULATOR_MODEL};
use crate::protocol::packet::{Packet, PacketType};

pub mod session;

pub use session::{SessionState, AUTH_TIMEOUT, SESSION_IDLE_TIMEOUT};

/// How long warmup (and by default cooldown) takes.
pub const EMULATOR_WARMUP_TIME: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct EmulatorOptions {
    pub model: String,
    pub password: Option<String>,
    pub bind: SocketAddr,
    pub initial_power: String,
    pub initial_input: String,
    pub initial_gamma_table: String,
    pub initial_gamma_value: String,
    pub initial_source: String,
    pub firmware_version: String,
    pub warmup_time: Duration,
    pub cooldown_time: Duration,
    /// Announce ourselves over discovery; `None` stays silent.
    pub discovery: Option<ServerOptions>,
}

impl Default for EmulatorOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_EMULATOR_MODEL.to_string(),
            password: None,
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            initial_power: "Standby".to_string(),
            initial_input: "HDMI 1".to_string(),
            initial_gamma_table: "Normal".to_string(),
            initial_gamma_value: "2.2".to_string(),
            initial_source: "Signal OK".to_string(),
            firmware_version: "3.010".to_string(),
            warmup_time: EMULATOR_WARMUP_TIME,
            cooldown_time: EMULATOR_WARMUP_TIME,
            discovery: None,
        }
    }
}

struct EmulatorState {
    power: Vec<u8>,
    input: Vec<u8>,
    gamma_table: Vec<u8>,
    gamma_value: Vec<u8>,
    source: Vec<u8>,
    firmware: Vec<u8>,
    warmup_timer: Option<JoinHandle<()>>,
    cooldown_timer: Option<JoinHandle<()>>,
}

/// State and behavior shared by every session.
pub(crate) struct EmulatorShared {
    pub(crate) model: &'static ReceiverModel,
    pub(crate) password: Option<String>,
    warmup_time: Duration,
    cooldown_time: Duration,
    state: Mutex<EmulatorState>,
}

fn status_payload(query_name: &str, status: &str) -> Result<Vec<u8>> {
    let meta = name_to_meta(query_name)?;
    meta.mapper()
        .str_to_payload(status)
        .ok_or_else(|| ParcError::Other(format!("unknown {query_name} status '{status}'")))
}

impl EmulatorShared {
    fn new(options: &EmulatorOptions) -> Result<Self> {
        let firmware = status_payload(
            "firmware_version_status.query",
            &options.firmware_version,
        )?;
        let state = EmulatorState {
            power: status_payload("power_status.query", &options.initial_power)?,
            input: status_payload("input_status.query", &options.initial_input)?,
            gamma_table: status_payload("gamma_table_status.query", &options.initial_gamma_table)?,
            gamma_value: status_payload("gamma_value_status.query", &options.initial_gamma_value)?,
            source: status_payload("source_status.query", &options.initial_source)?,
            firmware,
            warmup_timer: None,
            cooldown_timer: None,
        };
        Ok(Self {
            model: model_by_name(&options.model)?,
            password: options.password.clone().filter(|p| !p.is_empty()),
            warmup_time: options.warmup_time,
            cooldown_time: options.cooldown_time,
            state: Mutex::new(state),
        })
    }

    fn state(&self) -> Result<std::sync::MutexGuard<'_, EmulatorState>> {
        self.state
            .lock()
            .map_err(|_| ParcError::Other("emulator state poisoned".to_string()))
    }

    pub(crate) fn power_status_str(&self) -> Result<String> {
        let payload = self.state()?.power.clone();
        name_to_meta("power_status.query")?
            .mapper()
            .payload_to_str(&payload)
            .ok_or_else(|| ParcError::Other("invalid power state".to_string()))
    }

    /// Force the power status, cancelling any transition in flight. A
    /// new Warming/Cooling status restarts the matching timer.
    pub(crate) fn set_power_status(self: &Arc<Self>, status: &str) -> Result<()> {
        let payload = status_payload("power_status.query", status)?;
        let mut state = self.state()?;
        cancel_timers(&mut state);
        state.power = payload;
        debug!(status, "power status set");
        match status {
            "Warming" => state.warmup_timer = Some(self.start_settle_timer(true)),
            "Cooling" => state.cooldown_timer = Some(self.start_settle_timer(false)),
            _ => {}
        }
        Ok(())
    }

    /// One-shot transition out of Warming (to On) or Cooling (to
    /// Standby) after the configured time, unless the status changed
    /// underneath.
    fn start_settle_timer(self: &Arc<Self>, warming: bool) -> JoinHandle<()> {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let (delay, from, to) = if warming {
                (shared.warmup_time, b"\x33", b"\x31")
            } else {
                (shared.cooldown_time, b"\x32", b"\x30")
            };
            tokio::time::sleep(delay).await;
            if let Ok(mut state) = shared.state.lock()
                && state.power == from
            {
                info!(
                    status = if warming { "On" } else { "Standby" },
                    "power transition complete"
                );
                state.power = to.to_vec();
                if warming {
                    state.warmup_timer = None;
                } else {
                    state.cooldown_timer = None;
                }
            }
        })
    }

    /// Handle one command packet, returning the packets to send back.
    /// An empty vec means the receiver stays silent, which real
    /// hardware does for `power.on`/`power.off` in the wrong state.
    pub(crate) fn handle_packet(self: &Arc<Self>, packet: &Packet) -> Result<Vec<Packet>> {
        match packet.packet_type() {
            PacketType::BasicCommand | PacketType::AdvancedCommand => {}
            other => {
                return Err(ParcError::ProtocolViolation(match other {
                    PacketType::BasicResponse | PacketType::AdvancedResponse => {
                        "response packet sent as command"
                    }
                    _ => "not a command packet",
                }));
            }
        }
        let candidates = resolve_command_packet(packet);
        let meta = rank_candidates(&candidates, Some(self.model)).ok_or_else(|| {
            ParcError::UnknownCommand(format!(
                "code {:02X?} payload {:02X?}",
                packet.command_code(),
                packet.payload()
            ))
        })?;
        debug!(command = %meta.full_name(), "handling command");
        self.run_command(meta)
    }

    fn run_command(self: &Arc<Self>, meta: CommandMeta) -> Result<Vec<Packet>> {
        let code = meta.command_code();
        let ack = Packet::synthesize(PacketType::BasicResponse, code, b"")?;
        let reply = |payload: &[u8]| -> Result<Vec<Packet>> {
            Ok(vec![
                Packet::synthesize(PacketType::BasicResponse, code, b"")?,
                Packet::synthesize(PacketType::AdvancedResponse, code, payload)?,
            ])
        };

        match meta.full_name().as_str() {
            "power.on" => {
                if self.state()?.power != b"\x30" {
                    return Ok(Vec::new());
                }
                self.set_power_status("Warming")?;
                Ok(vec![ack])
            }
            "power.off" => {
                if self.state()?.power != b"\x31" {
                    return Ok(Vec::new());
                }
                self.set_power_status("Cooling")?;
                Ok(vec![ack])
            }
            "power_status.query" => reply(&self.state()?.power.clone()),
            "model_status.query" => reply(self.model.status_payload),
            "input_status.query" => reply(&self.state()?.input.clone()),
            "gamma_table_status.query" => reply(&self.state()?.gamma_table.clone()),
            "gamma_value_status.query" => reply(&self.state()?.gamma_value.clone()),
            "source_status.query" => reply(&self.state()?.source.clone()),
            "firmware_version_status.query" => reply(&self.state()?.firmware.clone()),
            _ => match meta.group.name {
                "set_input" => {
                    self.state()?.input = meta.spec.prefix.to_vec();
                    Ok(vec![ack])
                }
                "gamma" => {
                    self.state()?.gamma_table = meta.spec.prefix.to_vec();
                    Ok(vec![ack])
                }
                "gamma_value" => {
                    self.state()?.gamma_value = meta.spec.prefix.to_vec();
                    Ok(vec![ack])
                }
                _ if !meta.is_advanced() => Ok(vec![ack]),
                // An advanced command without modelled state: answer
                // with the smallest valid payload, like the hardware's
                // pick-something behavior.
                _ => {
                    let payloads = meta.mapper().known_payloads().ok_or_else(|| {
                        ParcError::Other(format!(
                            "no valid response payloads for {}",
                            meta.full_name()
                        ))
                    })?;
                    let smallest = payloads.first().copied().ok_or_else(|| {
                        ParcError::Other(format!(
                            "no valid response payloads for {}",
                            meta.full_name()
                        ))
                    })?;
                    reply(smallest)
                }
            },
        }
    }
}

fn cancel_timers(state: &mut EmulatorState) {
    for timer in take_timers(state) {
        timer.abort();
    }
}

fn take_timers(state: &mut EmulatorState) -> Vec<JoinHandle<()>> {
    state
        .warmup_timer
        .take()
        .into_iter()
        .chain(state.cooldown_timer.take())
        .collect()
}

/// A running emulator: TCP acceptor plus optional discovery presence.
pub struct Emulator {
    shared: Arc<EmulatorShared>,
    local_addr: SocketAddr,
    accept_task: Option<JoinHandle<()>>,
    dp_server: Option<DpServer>,
}

impl Emulator {
    pub async fn start(options: EmulatorOptions) -> Result<Self> {
        let shared = Arc::new(EmulatorShared::new(&options)?);
        let listener = TcpListener::bind(options.bind).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, model = shared.model.name, "emulator listening");

        let accept_task = tokio::spawn(Self::accept_loop(listener, shared.clone()));

        let dp_server = match options.discovery {
            Some(mut dp_options) => {
                dp_options.tcp_port = local_addr.port();
                dp_options.model_name = shared.model.name.to_string();
                Some(DpServer::start(dp_options).await?)
            }
            None => None,
        };

        Ok(Self {
            shared,
            local_addr,
            accept_task: Some(accept_task),
            dp_server,
        })
    }

    async fn accept_loop(listener: TcpListener, shared: Arc<EmulatorShared>) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "session accepted");
                    tokio::spawn(session::run_session(stream, shared.clone()));
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    return;
                }
            }
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn power_status(&self) -> Result<String> {
        self.shared.power_status_str()
    }

    /// Override the power status, e.g. to simulate an emergency.
    pub fn set_power_status(&self, status: &str) -> Result<()> {
        self.shared.set_power_status(status)
    }

    /// Orderly shutdown: cancel the acceptor, discovery presence, and
    /// settle timers, and wait for each to finish before returning.
    pub async fn shut_down(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
            let _ = task.await;
        }
        if let Some(mut dp_server) = self.dp_server.take() {
            dp_server.shut_down().await;
        }
        let timers = match self.shared.state.lock() {
            Ok(mut state) => take_timers(&mut state),
            Err(_) => Vec::new(),
        };
        for timer in timers {
            timer.abort();
            let _ = timer.await;
        }
    }

    /// Cancel without waiting; last resort for `Drop`.
    pub fn stop(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
        if let Some(mut dp_server) = self.dp_server.take() {
            dp_server.stop();
        }
        if let Ok(mut state) = self.shared.state.lock() {
            cancel_timers(&mut state);
        }
    }
}

impl Drop for Emulator {
    fn drop(&mut self) {
        self.stop();
    }
}
