//! One emulator session: greeting, authentication, command loop.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::emulator::EmulatorShared;
use crate::error::{ParcError, Result};
use crate::protocol::codec::PacketCodec;
use crate::protocol::constants::{PJACK, PJNAK, PJREQ, PJ_OK};
use tokio_util::codec::Framed;

/// A client must complete authentication this quickly.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(5);

/// An authenticated session is dropped after this much silence.
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a session is in its lifecycle. Authentication either leads
/// into the command loop via `SendingAuthAck`, or to `Closed` via
/// `SendingAuthNak`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconnected,
    SendingGreeting,
    ReadingAuthentication,
    SendingAuthAck,
    SendingAuthNak,
    ReadingCommand,
    RunningCommand,
    Closed,
}

impl SessionState {
    pub fn can_transition(self, next: Self) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Unconnected, SendingGreeting)
                | (SendingGreeting, ReadingAuthentication)
                | (ReadingAuthentication, SendingAuthAck)
                | (ReadingAuthentication, SendingAuthNak)
                | (SendingAuthAck, ReadingCommand)
                | (SendingAuthNak, Closed)
                | (ReadingCommand, RunningCommand)
                | (RunningCommand, ReadingCommand)
                | (ReadingCommand, Closed)
                | (RunningCommand, Closed)
        )
    }
}

fn advance(state: &mut SessionState, next: SessionState) -> Result<()> {
    if !state.can_transition(next) {
        return Err(ParcError::Other(format!(
            "invalid session transition {state:?} -> {next:?}"
        )));
    }
    trace!(from = ?state, to = ?next, "session state");
    *state = next;
    Ok(())
}

pub(crate) async fn run_session(stream: TcpStream, shared: Arc<EmulatorShared>) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string());
    if let Err(e) = serve(stream, &shared).await {
        debug!(peer, error = %e, "session ended with error");
    } else {
        debug!(peer, "session closed");
    }
}

async fn serve(mut stream: TcpStream, shared: &Arc<EmulatorShared>) -> Result<()> {
    let mut state = SessionState::Unconnected;

    advance(&mut state, SessionState::SendingGreeting)?;
    stream.write_all(PJ_OK).await?;
    advance(&mut state, SessionState::ReadingAuthentication)?;

    let mut expected = PJREQ.to_vec();
    if let Some(password) = &shared.password {
        expected.extend_from_slice(b"_");
        expected.extend_from_slice(password.as_bytes());
    }
    let mut received = vec![0u8; expected.len()];
    let authenticated = matches!(
        timeout(AUTH_TIMEOUT, stream.read_exact(&mut received)).await,
        Ok(Ok(_)) if received == expected
    );
    if !authenticated {
        debug!("authentication failed");
        advance(&mut state, SessionState::SendingAuthNak)?;
        stream.write_all(PJNAK).await?;
        advance(&mut state, SessionState::Closed)?;
        return Ok(());
    }
    advance(&mut state, SessionState::SendingAuthAck)?;
    stream.write_all(PJACK).await?;
    advance(&mut state, SessionState::ReadingCommand)?;

    let mut framed = Framed::new(stream, PacketCodec);
    loop {
        let packet = match timeout(SESSION_IDLE_TIMEOUT, framed.next()).await {
            Err(_) => {
                debug!("session idle timeout");
                advance(&mut state, SessionState::Closed)?;
                return Ok(());
            }
            Ok(None) => {
                advance(&mut state, SessionState::Closed)?;
                return Ok(());
            }
            Ok(Some(packet)) => packet?,
        };
        advance(&mut state, SessionState::RunningCommand)?;
        for response in shared.handle_packet(&packet)? {
            framed.send(response).await?;
        }
        advance(&mut state, SessionState::ReadingCommand)?;
    }
}

// ── Tests ────────────────────────────────────────────────────────
