//! Wire-level constants for the receiver control protocol.
//!
//! One canonical protocol revision only: magic `0x89 0x01`, newline
//! terminator, TCP control port 14999. Older firmware revisions used a
//! different port and terminator; those are not supported here.

use std::time::Duration;

// ── Packet framing ───────────────────────────────────────────────

/// Two magic bytes following the packet type byte.
pub const PACKET_MAGIC: [u8; 2] = [0x89, 0x01];

/// Every packet ends with this byte.
pub const END_OF_PACKET: u8 = 0x0A;

/// Smallest legal packet: type + magic + command code + terminator.
pub const MIN_PACKET_LEN: usize = 6;

/// Largest legal packet.
pub const MAX_PACKET_LEN: usize = 256;

// ── Handshake (pre-protocol, no terminators) ─────────────────────

/// Greeting sent by the receiver on accept.
pub const PJ_OK: &[u8] = b"PJ_OK";

/// Authentication request sent by the client. A configured password is
/// appended as `_<password>`.
pub const PJREQ: &[u8] = b"PJREQ";

/// Authentication accepted.
pub const PJACK: &[u8] = b"PJACK";

/// Authentication rejected.
pub const PJNAK: &[u8] = b"PJNAK";

// ── Network defaults ─────────────────────────────────────────────

/// TCP control port.
pub const DEFAULT_PORT: u16 = 14999;

// ── Timeouts ─────────────────────────────────────────────────────

/// Default per-operation timeout on a connected transport.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Idle time after which a reconnecting transport drops its inner
/// connection, freeing the receiver's single client slot.
pub const IDLE_DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Overall deadline for establishing a connection, including retries.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Pause between connect attempts while the receiver refuses us.
pub const CONNECT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// How long to wait for warmup/cooldown to finish before giving up.
pub const STABLE_POWER_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll interval while waiting for power to stabilize.
pub const POWER_POLL_INTERVAL: Duration = Duration::from_millis(500);
