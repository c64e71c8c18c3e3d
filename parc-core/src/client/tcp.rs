//! TCP transport.
//!
//! Dials the receiver's control port, performs the plaintext
//! handshake, then frames packets with [`PacketCodec`]. Any error
//! during a transaction tears the whole transport down; the reason is
//! kept so later callers see why.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex as AsyncMutex, Semaphore};
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::client::config::ClientConfig;
use crate::client::transport::{MultiTransactOutcome, Transport};
use crate::error::{ParcError, Result};
use crate::protocol::codec::PacketCodec;
use crate::protocol::command::{Command, Response};
use crate::protocol::constants::{PJACK, PJNAK, PJREQ, PJ_OK};
use crate::protocol::packet::Packet;

/// Connection lifecycle. A [`TcpTransport`] instance only exists from
/// `Connected` on; the earlier states describe the dial and handshake
/// path inside [`TcpTransport::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Unconnected,
    Handshaking,
    Connected,
    ShuttingDown,
    Closed,
}

impl TransportState {
    /// The lifecycle only moves forward, one step at a time.
    pub fn can_transition(self, next: Self) -> bool {
        use TransportState::*;
        matches!(
            (self, next),
            (Unconnected, Handshaking)
                | (Handshaking, Connected)
                | (Connected, ShuttingDown)
                | (ShuttingDown, Closed)
        )
    }
}

/// A live, handshaken control connection.
#[derive(Debug)]
pub struct TcpTransport {
    stream: AsyncMutex<Option<Framed<TcpStream, PacketCodec>>>,
    /// Transaction lock; closed on shutdown so waiters fail fast.
    lock: Semaphore,
    timeout: Duration,
    state: Mutex<TransportState>,
    status: Mutex<Option<Arc<ParcError>>>,
    done_tx: watch::Sender<bool>,
}

impl TcpTransport {
    /// Dial `host:port`, retrying while the receiver refuses the
    /// connection, then handshake.
    ///
    /// A refused connect is retried until the connect deadline; any
    /// other connect error is final.
    pub async fn connect(host: &str, port: u16, config: &ClientConfig) -> Result<Arc<Self>> {
        let connect_timeout = config.connect_timeout();
        let retry_interval = config.connect_retry_interval();
        let stream = timeout(connect_timeout, async {
            loop {
                match TcpStream::connect((host, port)).await {
                    Ok(stream) => break Ok::<_, ParcError>(stream),
                    Err(e) => {
                        let err = ParcError::from(e);
                        if !err.is_transient_connect() {
                            break Err(err);
                        }
                        debug!(host, port, "connection refused, retrying");
                        tokio::time::sleep(retry_interval).await;
                    }
                }
            }
        })
        .await
        .map_err(|_| ParcError::ConnectTimeout(connect_timeout))??;

        stream.set_nodelay(true)?;
        Self::from_stream(stream, config).await
    }

    /// Handshake over an established stream and wrap it.
    pub async fn from_stream(mut stream: TcpStream, config: &ClientConfig) -> Result<Arc<Self>> {
        let op_timeout = config.timeout();
        timeout(op_timeout, Self::handshake(&mut stream, config.password_bytes()))
            .await
            .map_err(|_| ParcError::Timeout(op_timeout))??;
        debug!("handshake complete");

        let (done_tx, _) = watch::channel(false);
        Ok(Arc::new(Self {
            stream: AsyncMutex::new(Some(Framed::new(stream, PacketCodec))),
            lock: Semaphore::new(1),
            timeout: op_timeout,
            state: Mutex::new(TransportState::Connected),
            status: Mutex::new(None),
            done_tx,
        }))
    }

    pub fn state(&self) -> TransportState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(TransportState::Closed)
    }

    /// `PJ_OK` → `PJREQ[password]` → `PJACK`. None of the handshake
    /// strings carry a terminator.
    async fn handshake(stream: &mut TcpStream, password: Option<&[u8]>) -> Result<()> {
        let mut greeting = [0u8; PJ_OK.len()];
        stream.read_exact(&mut greeting).await?;
        if greeting != PJ_OK {
            return Err(ParcError::HandshakeMismatch { expected: "PJ_OK" });
        }

        let mut request = PJREQ.to_vec();
        if let Some(password) = password {
            request.extend_from_slice(b"_");
            request.extend_from_slice(password);
        }
        stream.write_all(&request).await?;

        let mut ack = [0u8; PJACK.len()];
        stream.read_exact(&mut ack).await?;
        if ack == PJNAK {
            return Err(ParcError::AuthenticationRejected);
        }
        if ack != PJACK {
            return Err(ParcError::HandshakeMismatch { expected: "PJACK" });
        }
        Ok(())
    }

    /// The stored shutdown reason, as a shareable error.
    fn status_error(&self) -> ParcError {
        match self.status.lock().ok().and_then(|s| s.clone()) {
            Some(reason) => ParcError::shared(&reason),
            None => ParcError::TransportShutDown,
        }
    }

    /// One exchange while already holding the transaction lock. On
    /// failure the transport is torn down with the error as reason.
    async fn transact_locked(&self, command: &Command) -> Result<Response> {
        match self.exchange(command).await {
            Ok(response) => Ok(response),
            Err(err) => {
                warn!(command = %command.name(), error = %err, "transaction failed, shutting down");
                let shared = Arc::new(err);
                self.shut_down_with(Some(shared.clone())).await;
                Err(ParcError::shared(&shared))
            }
        }
    }

    async fn exchange(&self, command: &Command) -> Result<Response> {
        let mut guard = self.stream.lock().await;
        let framed = guard.as_mut().ok_or_else(|| self.status_error())?;

        timeout(self.timeout, framed.send(command.packet.clone()))
            .await
            .map_err(|_| ParcError::Timeout(self.timeout))??;

        let basic = self.next_packet(framed).await?;
        let advanced = if command.is_advanced() {
            Some(self.next_packet(framed).await?)
        } else {
            None
        };
        drop(guard);
        command.response_from_packets(basic, advanced)
    }

    async fn next_packet(&self, framed: &mut Framed<TcpStream, PacketCodec>) -> Result<Packet> {
        match timeout(self.timeout, framed.next()).await {
            Err(_) => Err(ParcError::Timeout(self.timeout)),
            Ok(None) => Err(ParcError::Connection(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed mid-transaction",
            ))),
            Ok(Some(packet)) => packet,
        }
    }

    async fn shut_down_with(&self, reason: Option<Arc<ParcError>>) {
        // First caller wins; anyone arriving once the teardown has
        // started leaves both the state and the stored reason alone.
        {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            if !state.can_transition(TransportState::ShuttingDown) {
                return;
            }
            *state = TransportState::ShuttingDown;
        }
        if let Ok(mut status) = self.status.lock()
            && status.is_none()
        {
            *status = reason;
        }
        self.lock.close();
        if let Some(framed) = self.stream.lock().await.take() {
            let mut stream = framed.into_inner();
            let _ = stream.shutdown().await;
        }
        if let Ok(mut state) = self.state.lock() {
            *state = TransportState::Closed;
        }
        let _ = self.done_tx.send(true);
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn transact(&self, command: Command) -> Result<Response> {
        let _permit = self
            .lock
            .acquire()
            .await
            .map_err(|_| self.status_error())?;
        self.transact_locked(&command).await
    }

    async fn transact_many(&self, commands: Vec<Command>) -> MultiTransactOutcome {
        let permit = self.lock.acquire().await;
        if permit.is_err() {
            return MultiTransactOutcome::failure(Vec::new(), self.status_error());
        }
        let mut responses = Vec::with_capacity(commands.len());
        for command in commands {
            match self.transact_locked(&command).await {
                Ok(response) => responses.push(response),
                Err(err) => return MultiTransactOutcome::failure(responses, err),
            }
        }
        MultiTransactOutcome::success(responses)
    }

    async fn shut_down(&self, reason: Option<ParcError>) {
        self.shut_down_with(reason.map(Arc::new)).await;
    }

    fn is_shut_down(&self) -> bool {
        *self.done_tx.borrow()
    }

    async fn wait_shut_down(&self) -> Option<Arc<ParcError>> {
        let mut rx = self.done_tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                break;
            }
        }
        self.status.lock().ok().and_then(|s| s.clone())
    }
}
