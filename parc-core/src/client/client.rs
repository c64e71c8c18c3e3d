//! High-level receiver client.
//!
//! Wraps a transport with the operations callers actually want: named
//! commands, power sequencing that rides out warmup and cooldown, and
//! model/firmware queries. The receiver model is learned from the
//! first `model_status` answer when the config doesn't pin one.

use std::sync::{Arc, Mutex};

use tokio::time::timeout;
use tracing::{debug, info};

use crate::client::config::ClientConfig;
use crate::client::connector::{Connector, GeneralConnector};
use crate::client::reconnect::ReconnectTransport;
use crate::client::transport::{MultiTransactOutcome, Transport};
use crate::error::{ParcError, Result};
use crate::protocol::command::{Command, Response};
use crate::protocol::constants::POWER_POLL_INTERVAL;
use crate::protocol::model::{model_by_name, model_for_status_payload, ReceiverModel};

pub struct ReceiverClient {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    model: Mutex<Option<&'static ReceiverModel>>,
}

impl ReceiverClient {
    /// Connect according to the config's host specifier.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let connector: Arc<dyn Connector> = Arc::new(GeneralConnector::from_config(config.clone())?);
        let transport: Arc<dyn Transport> = if config.auto_reconnect {
            ReconnectTransport::new(connector, config.idle_disconnect())
        } else {
            connector.connect().await?
        };
        Self::from_transport(transport, config)
    }

    /// Wrap an existing transport.
    pub fn from_transport(transport: Arc<dyn Transport>, config: ClientConfig) -> Result<Self> {
        let model = match &config.model {
            Some(name) => Some(model_by_name(name)?),
            None => None,
        };
        Ok(Self {
            transport,
            config,
            model: Mutex::new(model),
        })
    }

    /// The model, as configured or learned from the receiver.
    pub fn model(&self) -> Option<&'static ReceiverModel> {
        self.model.lock().ok().and_then(|m| *m)
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    // ── Transactions ─────────────────────────────────────────────

    pub async fn transact(&self, command: Command) -> Result<Response> {
        if let Some(model) = self.model()
            && let Some(models) = command.meta.model_names()
            && !models.contains(&model.name)
        {
            return Err(ParcError::UnknownCommand(format!(
                "{} is not supported by {}",
                command.name(),
                model.name
            )));
        }
        let response = self.transport.transact(command).await?;
        self.learn_model(&response);
        Ok(response)
    }

    pub async fn transact_by_name(&self, full_name: &str) -> Result<Response> {
        self.transact(Command::from_name(full_name)?).await
    }

    /// Run several commands as one serialized batch.
    pub async fn multi_transact(&self, full_names: &[&str]) -> Result<MultiTransactOutcome> {
        let commands = full_names
            .iter()
            .map(|name| Command::from_name(name))
            .collect::<Result<Vec<_>>>()?;
        let outcome = self.transport.transact_many(commands).await;
        for response in &outcome.responses {
            self.learn_model(response);
        }
        Ok(outcome)
    }

    fn learn_model(&self, response: &Response) {
        if response.command.name() != "model_status.query" {
            return;
        }
        if let Ok(mut slot) = self.model.lock()
            && slot.is_none()
            && let Some(model) = model_for_status_payload(response.payload())
        {
            info!(model = model.name, "learned receiver model");
            *slot = Some(model);
        }
    }

    // ── Queries ──────────────────────────────────────────────────

    pub async fn power_status(&self) -> Result<String> {
        self.transact_by_name("power_status.query")
            .await?
            .response_str()
    }

    pub async fn input_status(&self) -> Result<String> {
        self.transact_by_name("input_status.query")
            .await?
            .response_str()
    }

    /// All marketing names of the receiver's model, comma-delimited.
    pub async fn model_status(&self) -> Result<String> {
        self.transact_by_name("model_status.query")
            .await?
            .response_str()
    }

    /// Firmware version in `major.minor` form, e.g. `3.010`.
    pub async fn firmware_version(&self) -> Result<String> {
        self.transact_by_name("firmware_version_status.query")
            .await?
            .response_str()
    }

    // ── Commands ─────────────────────────────────────────────────

    pub async fn power_on(&self) -> Result<Response> {
        self.transact_by_name("power.on").await
    }

    pub async fn power_off(&self) -> Result<Response> {
        self.transact_by_name("power.off").await
    }

    /// Switch input by short name, e.g. `hdmi_1`.
    pub async fn set_input(&self, input: &str) -> Result<Response> {
        self.transact_by_name(&format!("set_input.{input}")).await
    }

    // ── Power sequencing ─────────────────────────────────────────

    /// Poll until the power status leaves Warming/Cooling, returning
    /// the settled status.
    pub async fn power_status_wait(&self) -> Result<String> {
        let deadline = self.config.stable_power_timeout();
        timeout(deadline, async {
            loop {
                let status = self.power_status().await?;
                if status != "Warming" && status != "Cooling" {
                    return Ok(status);
                }
                debug!(status, "waiting for power to settle");
                tokio::time::sleep(POWER_POLL_INTERVAL).await;
            }
        })
        .await
        .map_err(|_| ParcError::Timeout(deadline))?
    }

    /// Turn the receiver on, riding out a cooldown in progress. With
    /// `wait_for_final` the call returns only once fully on.
    pub async fn power_on_wait(&self, wait_for_final: bool) -> Result<String> {
        let mut status = self.power_status().await?;
        if status == "Cooling" || (status == "Warming" && wait_for_final) {
            status = self.power_status_wait().await?;
        }
        if status == "Standby" {
            self.power_on().await?;
            status = if wait_for_final {
                self.power_status_wait().await?
            } else {
                self.power_status().await?
            };
        }
        match status.as_str() {
            "On" => Ok(status),
            "Warming" if !wait_for_final => Ok(status),
            "Emergency" => Err(ParcError::Other(
                "receiver is in emergency state".to_string(),
            )),
            other => Err(ParcError::Other(format!(
                "power-on failed, receiver reports {other}"
            ))),
        }
    }

    /// Turn the receiver off, riding out a warmup in progress.
    pub async fn power_off_wait(&self, wait_for_final: bool) -> Result<String> {
        let mut status = self.power_status().await?;
        if status == "Warming" || (status == "Cooling" && wait_for_final) {
            status = self.power_status_wait().await?;
        }
        if status == "On" {
            self.power_off().await?;
            status = if wait_for_final {
                self.power_status_wait().await?
            } else {
                self.power_status().await?
            };
        }
        match status.as_str() {
            "Standby" => Ok(status),
            "Cooling" if !wait_for_final => Ok(status),
            "Emergency" => Err(ParcError::Other(
                "receiver is in emergency state".to_string(),
            )),
            other => Err(ParcError::Other(format!(
                "power-off failed, receiver reports {other}"
            ))),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────

    pub async fn shut_down(&self) {
        self.transport.shut_down(None).await;
    }

    pub async fn wait_shut_down(&self) -> Option<Arc<ParcError>> {
        self.transport.wait_shut_down().await
    }
}
