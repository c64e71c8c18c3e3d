//! Discovery server: answers searches and advertises a device.
//!
//! Three background tasks over one shared socket:
//!   - responder: answers announce requests with our advertisement,
//!     sent to the broadcast target from every binding as the protocol
//!     requires
//!   - advertiser: periodic unsolicited advertisements
//!   - collector: gathers advertisements from other devices and feeds
//!     them to anyone listening

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::discovery::client::{default_target, DiscoveredReceiver};
use crate::discovery::datagram::DpDatagram;
use crate::discovery::socket::DpSocket;
use crate::error::Result;
use crate::protocol::constants::DEFAULT_PORT;
use crate::protocol::model::DEFAULT_EMULATOR_MODEL;

/// Advertised entries are considered fresh this long; the advertise
/// interval is two thirds of it so listeners never see us expire.
pub const ADVERTISEMENT_MAX_AGE: Duration = Duration::from_secs(1800);

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub device_name: String,
    pub model_name: String,
    pub serial_number: String,
    /// Control port announced in our advertisement.
    pub tcp_port: u16,
    pub is_off: bool,
    /// Zero disables unsolicited advertisements.
    pub advertise_interval: Duration,
    pub respond_to_queries: bool,
    /// Local addresses to bind, one socket each; empty means the
    /// wildcard address.
    pub binds: Vec<SocketAddr>,
    /// Where responses and advertisements are sent.
    pub target: SocketAddr,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            device_name: "AVMSIM".to_string(),
            model_name: DEFAULT_EMULATOR_MODEL.to_string(),
            serial_number: "1234567890".to_string(),
            tcp_port: DEFAULT_PORT,
            is_off: false,
            advertise_interval: ADVERTISEMENT_MAX_AGE * 2 / 3,
            respond_to_queries: true,
            binds: Vec::new(),
            target: default_target(),
        }
    }
}

impl ServerOptions {
    fn advertisement(&self) -> DpDatagram {
        let mut datagram = DpDatagram::new_advertisement(
            self.tcp_port,
            &self.device_name,
            &self.model_name,
            &self.serial_number,
        );
        datagram.is_off = self.is_off;
        datagram
    }
}

pub struct DpServer {
    socket: Arc<DpSocket>,
    collected: Arc<Mutex<HashMap<SocketAddr, DiscoveredReceiver>>>,
    notify_txs: Arc<Mutex<Vec<mpsc::Sender<DiscoveredReceiver>>>>,
    done_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl DpServer {
    pub async fn start(options: ServerOptions) -> Result<Self> {
        let socket = Arc::new(DpSocket::bind_many(options.binds.clone()).await?);
        info!(addr = %socket.local_addr(), device = %options.device_name, "discovery server listening");

        let collected = Arc::new(Mutex::new(HashMap::new()));
        let notify_txs: Arc<Mutex<Vec<mpsc::Sender<DiscoveredReceiver>>>> =
            Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        if options.respond_to_queries {
            tasks.push(tokio::spawn(Self::responder(
                socket.clone(),
                options.advertisement(),
                options.target,
            )));
        }
        if !options.advertise_interval.is_zero() {
            tasks.push(tokio::spawn(Self::advertiser(
                socket.clone(),
                options.advertisement(),
                options.target,
                options.advertise_interval,
                done_rx,
            )));
        }
        tasks.push(tokio::spawn(Self::collector(
            socket.clone(),
            collected.clone(),
            notify_txs.clone(),
        )));

        Ok(Self {
            socket,
            collected,
            notify_txs,
            done_tx,
            tasks,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr()
    }

    /// Devices heard advertising so far. Our own advertisements are
    /// included when they loop back to one of our bindings.
    pub fn collected(&self) -> Vec<DiscoveredReceiver> {
        self.collected
            .lock()
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Stream of advertisements as they arrive.
    pub fn subscribe_advertisements(&self) -> mpsc::Receiver<DiscoveredReceiver> {
        let (tx, rx) = mpsc::channel(64);
        if let Ok(mut txs) = self.notify_txs.lock() {
            txs.push(tx);
        }
        rx
    }

    /// Orderly shutdown: wake the advertiser out of its sleep, cancel
    /// all tasks, and wait for each to finish before returning.
    pub async fn shut_down(&mut self) {
        let _ = self.done_tx.send(true);
        for task in self.tasks.drain(..) {
            task.abort();
            let _ = task.await;
        }
    }

    /// Cancel without waiting; last resort for `Drop`.
    pub fn stop(&mut self) {
        let _ = self.done_tx.send(true);
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    async fn responder(socket: Arc<DpSocket>, advertisement: DpDatagram, target: SocketAddr) {
        let mut subscriber = socket.subscribe();
        while let Some(message) = subscriber.recv().await {
            if !message.datagram.announce_request {
                continue;
            }
            debug!(src = %message.src, binding = message.binding, "answering search request");
            if let Err(e) = socket.send_to(&advertisement, target).await {
                warn!(error = %e, "could not answer search request");
            }
        }
    }

    async fn advertiser(
        socket: Arc<DpSocket>,
        advertisement: DpDatagram,
        target: SocketAddr,
        interval: Duration,
        mut done: watch::Receiver<bool>,
    ) {
        loop {
            if let Err(e) = socket.send_to(&advertisement, target).await {
                warn!(error = %e, "could not send advertisement");
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = done.changed() => return,
            }
        }
    }

    async fn collector(
        socket: Arc<DpSocket>,
        collected: Arc<Mutex<HashMap<SocketAddr, DiscoveredReceiver>>>,
        notify_txs: Arc<Mutex<Vec<mpsc::Sender<DiscoveredReceiver>>>>,
    ) {
        let mut subscriber = socket.subscribe();
        while let Some(message) = subscriber.recv().await {
            let Some(receiver) = DiscoveredReceiver::from_message(&message) else {
                continue;
            };
            debug!(addr = %receiver.tcp_addr, device = %receiver.device_name, "collected advertisement");
            if let Ok(mut map) = collected.lock() {
                map.insert(receiver.tcp_addr, receiver.clone());
            }
            if let Ok(mut txs) = notify_txs.lock() {
                txs.retain(|tx| !matches!(
                    tx.try_send(receiver.clone()),
                    Err(mpsc::error::TrySendError::Closed(_))
                ));
            }
        }
    }
}

impl Drop for DpServer {
    fn drop(&mut self) {
        self.stop();
    }
}
