//! Reconnecting transport.
//!
//! Wraps a [`Connector`] and dials lazily: the first transaction after
//! a disconnect establishes a fresh connection, and a background task
//! drops the inner connection once it has sat idle long enough. The
//! receiver accepts a single control client, so holding the connection
//! open between bursts of commands locks everyone else out.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::{watch, Mutex as AsyncMutex, Notify, Semaphore};
use tokio::time::Instant;
use tracing::debug;

use crate::client::connector::Connector;
use crate::client::transport::{MultiTransactOutcome, Transport};
use crate::error::{ParcError, Result};
use crate::protocol::command::{Command, Response};

pub struct ReconnectTransport {
    connector: Arc<dyn Connector>,
    idle_disconnect: Duration,
    inner: AsyncMutex<Option<Arc<dyn Transport>>>,
    lock: Semaphore,
    last_used: Mutex<Option<Instant>>,
    idle_wake: Arc<Notify>,
    status: Mutex<Option<Arc<ParcError>>>,
    done_tx: watch::Sender<bool>,
}

impl ReconnectTransport {
    pub fn new(connector: Arc<dyn Connector>, idle_disconnect: Duration) -> Arc<Self> {
        let (done_tx, done_rx) = watch::channel(false);
        let idle_wake = Arc::new(Notify::new());
        let transport = Arc::new(Self {
            connector,
            idle_disconnect,
            inner: AsyncMutex::new(None),
            lock: Semaphore::new(1),
            last_used: Mutex::new(None),
            idle_wake: idle_wake.clone(),
            status: Mutex::new(None),
            done_tx,
        });
        tokio::spawn(Self::idle_loop(
            Arc::downgrade(&transport),
            idle_wake,
            done_rx,
        ));
        transport
    }

    /// Watches the last-used timestamp and drops the inner connection
    /// once it has been idle for the configured time. Holds only a
    /// weak reference so an abandoned transport can drop.
    async fn idle_loop(
        this: Weak<Self>,
        idle_wake: Arc<Notify>,
        mut done: watch::Receiver<bool>,
    ) {
        loop {
            let sleep_for = match this.upgrade() {
                Some(transport) => transport.time_until_idle(),
                None => return,
            };
            tokio::select! {
                _ = idle_wake.notified() => continue,
                _ = done.changed() => return,
                _ = async {
                    match sleep_for {
                        Some(remaining) => tokio::time::sleep(remaining).await,
                        None => std::future::pending().await,
                    }
                } => {
                    let Some(transport) = this.upgrade() else { return };
                    transport.disconnect_idle().await;
                }
            }
        }
    }

    /// Time left before the inner connection goes idle; `None` while
    /// disconnected.
    fn time_until_idle(&self) -> Option<Duration> {
        let last_used = (*self.last_used.lock().ok()?)?;
        Some(self.idle_disconnect.saturating_sub(last_used.elapsed()))
    }

    async fn disconnect_idle(&self) {
        let mut guard = self.inner.lock().await;
        let idle = self
            .last_used
            .lock()
            .ok()
            .and_then(|g| *g)
            .is_some_and(|t| t.elapsed() >= self.idle_disconnect);
        if !idle {
            return;
        }
        if let Some(inner) = guard.take() {
            debug!("disconnecting idle connection");
            inner.shut_down(None).await;
        }
        if let Ok(mut last_used) = self.last_used.lock() {
            *last_used = None;
        }
    }

    /// The current inner connection, dialing if there is none. An
    /// inner transport caught shutting down is awaited and discarded
    /// before the fresh dial.
    async fn ensure_connected(&self) -> Result<Arc<dyn Transport>> {
        let mut guard = self.inner.lock().await;
        if let Some(inner) = guard.as_ref() {
            if !inner.is_shut_down() {
                return Ok(inner.clone());
            }
            if let Some(stale) = guard.take() {
                stale.wait_shut_down().await;
            }
        }
        let fresh = self.connector.connect().await?;
        *guard = Some(fresh.clone());
        Ok(fresh)
    }

    /// Park the idle timer while a transaction is in flight so it
    /// cannot tear the connection down mid-exchange.
    fn suspend_idle(&self) {
        if let Ok(mut last_used) = self.last_used.lock() {
            *last_used = None;
        }
        self.idle_wake.notify_one();
    }

    fn touch(&self) {
        if let Ok(mut last_used) = self.last_used.lock() {
            *last_used = Some(Instant::now());
        }
        self.idle_wake.notify_one();
    }

    async fn drop_inner(&self) {
        if let Some(inner) = self.inner.lock().await.take() {
            inner.shut_down(None).await;
        }
    }

    fn status_error(&self) -> ParcError {
        match self.status.lock().ok().and_then(|s| s.clone()) {
            Some(reason) => ParcError::shared(&reason),
            None => ParcError::TransportShutDown,
        }
    }
}

#[async_trait::async_trait]
impl Transport for ReconnectTransport {
    async fn transact(&self, command: Command) -> Result<Response> {
        let _permit = self
            .lock
            .acquire()
            .await
            .map_err(|_| self.status_error())?;
        self.suspend_idle();
        let inner = self.ensure_connected().await?;
        // A failure surfaces as-is: the command may already have
        // reached the receiver, so re-sending it is not safe. The
        // failed connection is dropped and the next call redials.
        let result = inner.transact(command).await;
        if result.is_err() {
            self.drop_inner().await;
        }
        self.touch();
        result
    }

    async fn transact_many(&self, commands: Vec<Command>) -> MultiTransactOutcome {
        let permit = self.lock.acquire().await;
        if permit.is_err() {
            return MultiTransactOutcome::failure(Vec::new(), self.status_error());
        }
        self.suspend_idle();
        let inner = match self.ensure_connected().await {
            Ok(inner) => inner,
            Err(err) => return MultiTransactOutcome::failure(Vec::new(), err),
        };
        let outcome = inner.transact_many(commands).await;
        if outcome.error.is_some() {
            self.drop_inner().await;
        }
        self.touch();
        outcome
    }

    async fn shut_down(&self, reason: Option<ParcError>) {
        if let Ok(mut status) = self.status.lock()
            && status.is_none()
        {
            *status = reason.map(Arc::new);
        }
        self.lock.close();
        self.drop_inner().await;
        let _ = self.done_tx.send(true);
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

// ── Tests ────────────────────────────────────────────────────────
