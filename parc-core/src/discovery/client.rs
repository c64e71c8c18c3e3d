//! Discovery client: multicast search for receivers.
//!
//! A search subscribes to the socket before sending its query so no
//! response can slip by, then broadcasts an announce request from every
//! binding and collects advertisements for a bounded window. Unnamed
//! searches return on the first receiver heard from; named searches
//! listen out the whole window so an ambiguous name is detected rather
//! than silently picking one receiver.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime};

use tokio::time::Instant;
use tracing::debug;

use crate::discovery::datagram::DpDatagram;
use crate::discovery::socket::{DpMessage, DpSocket, DpSubscriber};
use crate::error::{ParcError, Result};
use crate::protocol::constants::DEFAULT_PORT;

/// Window for a named search; receivers answer well within this.
pub const NAMED_SEARCH_WAIT: Duration = Duration::from_secs(4);

/// Window for an unnamed search, which ends at the first response.
pub const UNNAMED_SEARCH_WAIT: Duration = Duration::from_secs(1);

/// The discovery broadcast target.
pub fn default_target() -> SocketAddr {
    SocketAddr::from(([255, 255, 255, 255], DEFAULT_PORT))
}

/// The local address a search binds; responses are broadcast back to
/// the discovery port, so the search must listen on it.
pub fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT))
}

/// Where and how to search.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Device name to search for, case-insensitively.
    pub name: Option<String>,
    /// Address the query is sent to.
    pub target: SocketAddr,
    /// Local addresses to bind, one socket each; empty means the
    /// wildcard address.
    pub binds: Vec<SocketAddr>,
    /// How long to listen for advertisements.
    pub wait: Duration,
    /// Stop early after this many distinct receivers.
    pub max_responses: Option<usize>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            name: None,
            target: default_target(),
            binds: Vec::new(),
            wait: UNNAMED_SEARCH_WAIT,
            max_responses: None,
        }
    }
}

impl SearchOptions {
    pub fn for_name(name: Option<&str>) -> Self {
        match name {
            Some(name) => Self {
                name: Some(name.to_string()),
                wait: NAMED_SEARCH_WAIT,
                ..Self::default()
            },
            None => Self::default(),
        }
    }

    fn matches(&self, found: &DiscoveredReceiver) -> bool {
        match &self.name {
            Some(name) => found.device_name.eq_ignore_ascii_case(name),
            None => true,
        }
    }
}

/// One receiver heard from during a search: the parsed advertisement
/// plus where and when it was heard.
#[derive(Debug, Clone)]
pub struct DiscoveredReceiver {
    /// Control endpoint: the advertisement's source IP and announced
    /// TCP port.
    pub tcp_addr: SocketAddr,
    pub device_name: String,
    pub model_name: String,
    pub serial_number: String,
    pub is_off: bool,
    pub version: u32,
    /// Index of the socket binding the advertisement arrived on.
    pub binding: usize,
    /// Monotonic receipt time, for age calculations.
    pub received_mono: Instant,
    /// Wall-clock receipt time, for display.
    pub received_at: SystemTime,
}

impl DiscoveredReceiver {
    /// Advertisements and responses qualify; announce requests (our
    /// own query echoed back) and nameless datagrams do not.
    pub(crate) fn from_message(message: &DpMessage) -> Option<Self> {
        let datagram = &message.datagram;
        if datagram.announce_request || datagram.device_name.is_empty() {
            return None;
        }
        Some(Self {
            tcp_addr: SocketAddr::new(message.src.ip(), datagram.tcp_port),
            device_name: datagram.device_name.clone(),
            model_name: datagram.model_name.clone(),
            serial_number: datagram.serial_number.clone(),
            is_off: datagram.is_off,
            version: datagram.version,
            binding: message.binding,
            received_mono: message.received_mono,
            received_at: message.received_at,
        })
    }
}

/// Collect every receiver that answers within the search window,
/// deduplicated by control endpoint.
pub async fn search(options: &SearchOptions) -> Result<Vec<DiscoveredReceiver>> {
    let socket = DpSocket::bind_many(options.binds.clone()).await?;
    let mut subscriber = socket.subscribe();
    socket.send_to(&DpDatagram::new_query(), options.target).await?;
    debug!(target = %options.target, "search query sent");

    let deadline = Instant::now() + options.wait;
    let mut found: HashMap<SocketAddr, DiscoveredReceiver> = HashMap::new();
    while let Some(receiver) = next_receiver(&mut subscriber, deadline).await {
        if options.matches(&receiver) {
            debug!(addr = %receiver.tcp_addr, device = %receiver.device_name, "receiver answered");
            found.insert(receiver.tcp_addr, receiver);
            if options.max_responses.is_some_and(|max| found.len() >= max) {
                break;
            }
        }
    }
    Ok(found.into_values().collect())
}

/// Find exactly one receiver.
///
/// Unnamed: the first receiver to answer wins. Named: the full window
/// is observed, and two distinct receivers with the searched name is
/// an error.
pub async fn search_one(options: &SearchOptions) -> Result<DiscoveredReceiver> {
    let socket = DpSocket::bind_many(options.binds.clone()).await?;
    let mut subscriber = socket.subscribe();
    socket.send_to(&DpDatagram::new_query(), options.target).await?;

    let deadline = Instant::now() + options.wait;
    let mut matches: HashMap<SocketAddr, DiscoveredReceiver> = HashMap::new();
    while let Some(receiver) = next_receiver(&mut subscriber, deadline).await {
        if !options.matches(&receiver) {
            continue;
        }
        if options.name.is_none() {
            return Ok(receiver);
        }
        matches.insert(receiver.tcp_addr, receiver);
    }
    match matches.len() {
        0 => Err(ParcError::NoReceiverFound {
            name: options.name.clone(),
        }),
        1 => Ok(matches
            .into_values()
            .next()
            .ok_or(ParcError::NoReceiverFound {
                name: options.name.clone(),
            })?),
        count => Err(ParcError::AmbiguousDiscovery { count }),
    }
}

async fn next_receiver(
    subscriber: &mut DpSubscriber,
    deadline: Instant,
) -> Option<DiscoveredReceiver> {
    loop {
        let message = tokio::time::timeout_at(deadline, subscriber.recv())
            .await
            .ok()??;
        if let Some(receiver) = DiscoveredReceiver::from_message(&message) {
            return Some(receiver);
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn message(src: &str, datagram: DpDatagram) -> DpMessage {
        DpMessage {
            binding: 0,
            src: src.parse().unwrap(),
            datagram,
            received_mono: Instant::now(),
            received_at: SystemTime::now(),
        }
    }

    #[test]
    fn announce_requests_and_nameless_datagrams_are_filtered() {
        let src = "10.0.0.9:14999";
        assert!(DiscoveredReceiver::from_message(&message(src, DpDatagram::new_query())).is_none());

        let mut nameless = DpDatagram::new_advertisement(14999, "", "DLA-NZ8", "SN");
        nameless.device_name = String::new();
        assert!(DiscoveredReceiver::from_message(&message(src, nameless)).is_none());

        let good = DpDatagram::new_advertisement(4242, "Den", "DLA-NZ8", "SN");
        let found = DiscoveredReceiver::from_message(&message(src, good)).unwrap();
        assert_eq!(found.tcp_addr, "10.0.0.9:4242".parse().unwrap());
        assert_eq!(found.binding, 0);
    }

    #[test]
    fn name_matching_is_case_insensitive() {
        let found = DiscoveredReceiver::from_message(&message(
            "10.0.0.9:14999",
            DpDatagram::new_advertisement(1, "Living Room", "DLA-NZ8", "SN"),
        ))
        .unwrap();
        let options = SearchOptions::for_name(Some("living room"));
        assert!(options.matches(&found));
        let other = SearchOptions::for_name(Some("den"));
        assert!(!other.matches(&found));
    }
}
