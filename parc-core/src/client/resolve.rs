//! Host specifiers and the discovery resolve cache.
//!
//! A host specifier names either a direct TCP endpoint
//! (`tcp://host[:port]` or bare `host[:port]`) or a receiver to find
//! via multicast discovery (`dp://` for any receiver, `dp://<name>`
//! for one by device name).
//!
//! Discovery results are cached per specifier so repeated connects do
//! not redo the multicast search. Entries carry an optional lifetime;
//! with no lifetime they stay until invalidated.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{LazyLock, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{ParcError, Result};

// ── Host specifiers ──────────────────────────────────────────────

/// A parsed host specifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HostSpec {
    /// Connect directly; `port` falls back to the config's port.
    Tcp { host: String, port: Option<u16> },
    /// Search via multicast discovery, optionally by device name.
    Discover { name: Option<String> },
}

impl HostSpec {
    /// Parse a specifier string.
    pub fn parse(spec: &str) -> Result<Self> {
        if let Some(name) = spec.strip_prefix("dp://") {
            return Ok(Self::Discover {
                name: (!name.is_empty()).then(|| name.to_string()),
            });
        }
        let rest = spec.strip_prefix("tcp://").unwrap_or(spec);
        if rest.is_empty() {
            return Err(ParcError::InvalidHostSpecifier(spec.to_string()));
        }
        match rest.rsplit_once(':') {
            Some((host, port)) => {
                if host.is_empty() {
                    return Err(ParcError::InvalidHostSpecifier(spec.to_string()));
                }
                let port = port
                    .parse()
                    .map_err(|_| ParcError::InvalidHostSpecifier(spec.to_string()))?;
                Ok(Self::Tcp {
                    host: host.to_string(),
                    port: Some(port),
                })
            }
            None => Ok(Self::Tcp {
                host: rest.to_string(),
                port: None,
            }),
        }
    }

    /// Key under which discovery results for this specifier are cached.
    pub fn cache_key(&self) -> Option<String> {
        match self {
            Self::Discover { name } => Some(match name {
                Some(name) => format!("dp://{name}"),
                None => "dp://".to_string(),
            }),
            Self::Tcp { .. } => None,
        }
    }
}

// ── Resolve cache ────────────────────────────────────────────────

struct CacheEntry {
    addr: SocketAddr,
    resolved_at: Instant,
}

/// Cache of discovery results keyed by specifier.
pub struct ResolveCache {
    ttl: Option<Duration>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResolveCache {
    /// A cache whose entries expire after `ttl`; `None` never expires.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<SocketAddr> {
        let mut entries = self.entries.lock().ok()?;
        let entry = entries.get(key)?;
        if let Some(ttl) = self.ttl
            && entry.resolved_at.elapsed() >= ttl
        {
            entries.remove(key);
            return None;
        }
        Some(entry.addr)
    }

    pub fn insert(&self, key: String, addr: SocketAddr) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                key,
                CacheEntry {
                    addr,
                    resolved_at: Instant::now(),
                },
            );
        }
    }

    /// Drop one entry, typically after a connect to it failed.
    pub fn invalidate(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

static PROCESS_CACHE: LazyLock<ResolveCache> = LazyLock::new(|| ResolveCache::new(None));

/// The process-wide cache shared by clients that don't bring their own.
pub fn process_default() -> &'static ResolveCache {
    &PROCESS_CACHE
}

// ── Tests ────────────────────────────────────────────────────────
