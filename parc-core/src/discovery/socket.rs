//! Shared discovery socket: per-interface bindings with subscriber
//! fan-out.
//!
//! One `DpSocket` is composed of one UDP socket per requested local
//! bind address (the wildcard address when none is given). Each
//! binding gets a stable index at attach time and its own receive
//! task; every incoming datagram is parsed, stamped with its binding
//! and receipt times, and handed to each live subscriber. Sends go out
//! on every binding so multi-homed hosts reach all their networks.
//! Sockets are built for broadcast with address (and, off Windows,
//! port) reuse so a client and a server can coexist on the discovery
//! port.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::discovery::client::default_bind;
use crate::discovery::datagram::{DpDatagram, DP_DATAGRAM_LEN};
use crate::error::Result;

/// Per-subscriber queue depth; datagrams are dropped, with a warning,
/// once a subscriber falls this far behind.
pub const SUBSCRIBER_QUEUE_SIZE: usize = 1000;

/// A received datagram: which binding heard it, where it came from,
/// and when.
#[derive(Debug, Clone)]
pub struct DpMessage {
    /// Index of the binding the datagram arrived on.
    pub binding: usize,
    pub src: SocketAddr,
    pub datagram: DpDatagram,
    /// Monotonic receipt time, for age calculations.
    pub received_mono: Instant,
    /// Wall-clock receipt time, for display.
    pub received_at: SystemTime,
}

/// One bound UDP socket; several compose a [`DpSocket`]. The index is
/// assigned at attach time and never changes.
pub struct DpBinding {
    index: usize,
    local_addr: SocketAddr,
    socket: Arc<UdpSocket>,
}

impl DpBinding {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

pub struct DpSocket {
    /// Never empty; `bind_many` substitutes the wildcard for an empty
    /// request.
    bindings: Vec<DpBinding>,
    subscribers: Arc<Mutex<Vec<mpsc::Sender<DpMessage>>>>,
    recv_tasks: Vec<JoinHandle<()>>,
}

impl DpSocket {
    /// Bind a single-interface discovery socket.
    pub async fn bind(bind: SocketAddr) -> Result<Self> {
        Self::bind_many(vec![bind]).await
    }

    /// Bind one socket per requested address and start a receive task
    /// for each. An empty request means the wildcard address.
    pub async fn bind_many(mut binds: Vec<SocketAddr>) -> Result<Self> {
        if binds.is_empty() {
            binds.push(default_bind());
        }
        let subscribers: Arc<Mutex<Vec<mpsc::Sender<DpMessage>>>> =
            Arc::new(Mutex::new(Vec::new()));
        let mut bindings = Vec::with_capacity(binds.len());
        let mut recv_tasks = Vec::with_capacity(binds.len());
        for (index, bind) in binds.into_iter().enumerate() {
            let socket = Arc::new(bind_one(bind)?);
            let local_addr = socket.local_addr()?;
            recv_tasks.push(tokio::spawn(Self::recv_loop(
                index,
                socket.clone(),
                subscribers.clone(),
            )));
            debug!(index, %local_addr, "discovery binding attached");
            bindings.push(DpBinding {
                index,
                local_addr,
                socket,
            });
        }
        Ok(Self {
            bindings,
            subscribers,
            recv_tasks,
        })
    }

    pub fn bindings(&self) -> &[DpBinding] {
        &self.bindings
    }

    /// Address of the first binding.
    pub fn local_addr(&self) -> SocketAddr {
        self.bindings[0].local_addr
    }

    /// Register a reader for every datagram arriving from now on, on
    /// any binding.
    pub fn subscribe(&self) -> DpSubscriber {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_SIZE);
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        DpSubscriber { rx }
    }

    /// Send one datagram to `target` from every binding.
    pub async fn send_to(&self, datagram: &DpDatagram, target: SocketAddr) -> Result<()> {
        let raw = datagram.encode()?;
        for binding in &self.bindings {
            binding.socket.send_to(&raw, target).await?;
        }
        Ok(())
    }

    async fn recv_loop(
        index: usize,
        socket: Arc<UdpSocket>,
        subscribers: Arc<Mutex<Vec<mpsc::Sender<DpMessage>>>>,
    ) {
        let mut buf = [0u8; DP_DATAGRAM_LEN + 1];
        loop {
            let (len, src) = match socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    warn!(index, error = %e, "discovery socket receive failed");
                    return;
                }
            };
            let datagram = match DpDatagram::parse(&buf[..len]) {
                Ok(datagram) => datagram,
                Err(e) => {
                    warn!(index, %src, error = %e, "ignoring malformed discovery datagram");
                    continue;
                }
            };
            let message = DpMessage {
                binding: index,
                src,
                datagram,
                received_mono: Instant::now(),
                received_at: SystemTime::now(),
            };
            if let Ok(mut subs) = subscribers.lock() {
                subs.retain(|tx| match tx.try_send(message.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(index, %src, "subscriber queue full, dropping datagram");
                        true
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                });
            }
        }
    }
}

impl Drop for DpSocket {
    fn drop(&mut self) {
        for task in &self.recv_tasks {
            task.abort();
        }
    }
}

/// Receiving end of a [`DpSocket::subscribe`] registration. Dropping
/// it unregisters the subscriber.
pub struct DpSubscriber {
    rx: mpsc::Receiver<DpMessage>,
}

impl DpSubscriber {
    /// Next datagram, or `None` once the socket is gone.
    pub async fn recv(&mut self) -> Option<DpMessage> {
        self.rx.recv().await
    }
}

fn bind_one(bind: SocketAddr) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    #[cfg(all(unix, not(target_os = "solaris")))]
    socket.set_reuse_port(true)?;
    #[cfg(target_os = "linux")]
    disable_multicast_all(&socket);
    socket.set_nonblocking(true)?;
    socket.bind(&bind.into())?;
    Ok(UdpSocket::from_std(socket.into())?)
}

/// Without this, a Linux socket bound to the wildcard address sees
/// multicast traffic for groups joined by any socket on the host,
/// which produces duplicate datagrams when several bindings coexist.
#[cfg(target_os = "linux")]
fn disable_multicast_all(socket: &Socket) {
    use std::os::fd::AsRawFd;

    const IP_MULTICAST_ALL: libc::c_int = 49;
    let off: libc::c_int = 0;
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::IPPROTO_IP,
            IP_MULTICAST_ALL,
            std::ptr::from_ref(&off).cast(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        warn!(
            error = %std::io::Error::last_os_error(),
            "could not disable IP_MULTICAST_ALL"
        );
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn fan_out_reaches_all_subscribers() {
        let receiver = DpSocket::bind(loopback()).await.unwrap();
        let sender = DpSocket::bind(loopback()).await.unwrap();
        let mut sub_a = receiver.subscribe();
        let mut sub_b = receiver.subscribe();

        let dg = DpDatagram::new_advertisement(14999, "Test", "DLA-NZ8", "SN1");
        sender.send_to(&dg, receiver.local_addr()).await.unwrap();

        let got_a = sub_a.recv().await.unwrap();
        let got_b = sub_b.recv().await.unwrap();
        assert_eq!(got_a.src.ip(), sender.local_addr().ip());
        assert_eq!(got_a.binding, 0);
        assert_eq!(got_a.datagram, dg);
        assert_eq!(got_b.datagram, dg);
    }

    #[tokio::test]
    async fn bindings_have_stable_indices() {
        let socket = DpSocket::bind_many(vec![loopback(), loopback()])
            .await
            .unwrap();
        let indices: Vec<usize> = socket.bindings().iter().map(|b| b.index()).collect();
        assert_eq!(indices, vec![0, 1]);
        assert_ne!(
            socket.bindings()[0].local_addr(),
            socket.bindings()[1].local_addr()
        );
    }

    #[tokio::test]
    async fn messages_carry_their_binding_index() {
        let receiver = DpSocket::bind_many(vec![loopback(), loopback()])
            .await
            .unwrap();
        let sender = DpSocket::bind(loopback()).await.unwrap();
        let mut sub = receiver.subscribe();

        let dg = DpDatagram::new_query();
        let second = receiver.bindings()[1].local_addr();
        sender.send_to(&dg, second).await.unwrap();

        let got = sub.recv().await.unwrap();
        assert_eq!(got.binding, 1);
    }

    #[tokio::test]
    async fn send_goes_out_on_every_binding() {
        let sender = DpSocket::bind_many(vec![loopback(), loopback()])
            .await
            .unwrap();
        let receiver = DpSocket::bind(loopback()).await.unwrap();
        let mut sub = receiver.subscribe();

        let dg = DpDatagram::new_query();
        sender.send_to(&dg, receiver.local_addr()).await.unwrap();

        // One copy per sending binding.
        let first = sub.recv().await.unwrap();
        let second = sub.recv().await.unwrap();
        assert_eq!(first.datagram, dg);
        assert_eq!(second.datagram, dg);
        assert_ne!(first.src, second.src);
    }

    #[tokio::test]
    async fn malformed_datagrams_are_skipped() {
        let receiver = DpSocket::bind(loopback()).await.unwrap();
        let sender = DpSocket::bind(loopback()).await.unwrap();
        let mut sub = receiver.subscribe();

        // Raw junk first, then a valid datagram; only the valid one
        // should come through.
        sender.bindings[0]
            .socket
            .send_to(b"junk", receiver.local_addr())
            .await
            .unwrap();
        let dg = DpDatagram::new_query();
        sender.send_to(&dg, receiver.local_addr()).await.unwrap();

        let got = sub.recv().await.unwrap();
        assert_eq!(got.datagram, dg);
    }

    #[tokio::test]
    async fn dropped_subscriber_is_pruned() {
        let receiver = DpSocket::bind(loopback()).await.unwrap();
        let sender = DpSocket::bind(loopback()).await.unwrap();
        let sub = receiver.subscribe();
        let mut live = receiver.subscribe();
        drop(sub);

        let dg = DpDatagram::new_query();
        sender.send_to(&dg, receiver.local_addr()).await.unwrap();
        live.recv().await.unwrap();
        assert_eq!(receiver.subscribers.lock().unwrap().len(), 1);
    }
}
