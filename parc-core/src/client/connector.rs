//! Connectors: how a transport gets its connection.
//!
//! A [`Connector`] produces a fresh, handshaken transport on demand;
//! the reconnecting transport calls it every time it needs to redial.
//! [`TcpConnector`] dials a fixed endpoint; [`GeneralConnector`] first
//! resolves a host specifier, going through multicast discovery and
//! the resolve cache for `dp://` specifiers.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::client::config::ClientConfig;
use crate::client::resolve::{self, HostSpec, ResolveCache};
use crate::client::tcp::TcpTransport;
use crate::client::transport::Transport;
use crate::discovery::client::{search_one, SearchOptions};
use crate::error::{ParcError, Result};

/// Produces a connected transport on demand.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn Transport>>;
}

// ── TcpConnector ─────────────────────────────────────────────────

/// Dials one fixed TCP endpoint.
pub struct TcpConnector {
    host: String,
    port: u16,
    config: ClientConfig,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16, config: ClientConfig) -> Self {
        Self {
            host: host.into(),
            port,
            config,
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> Result<Arc<dyn Transport>> {
        let transport = TcpTransport::connect(&self.host, self.port, &self.config).await?;
        Ok(transport)
    }
}

// ── GeneralConnector ─────────────────────────────────────────────

enum CacheHandle {
    Disabled,
    Process,
    Custom(Arc<ResolveCache>),
}

impl CacheHandle {
    fn get(&self) -> Option<&ResolveCache> {
        match self {
            Self::Disabled => None,
            Self::Process => Some(resolve::process_default()),
            Self::Custom(cache) => Some(cache),
        }
    }
}

/// Resolves a host specifier, then dials.
pub struct GeneralConnector {
    spec: HostSpec,
    config: ClientConfig,
    cache: CacheHandle,
    search: SearchOptions,
}

impl GeneralConnector {
    /// Build from a config; its `host` field is the specifier.
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let host = config
            .host
            .as_deref()
            .ok_or_else(|| ParcError::Config("no host configured".to_string()))?;
        let spec = HostSpec::parse(host)?;
        Ok(Self::new(spec, config))
    }

    pub fn new(spec: HostSpec, config: ClientConfig) -> Self {
        let cache = if !config.use_resolve_cache {
            CacheHandle::Disabled
        } else if let Some(ttl) = config.resolve_cache_ttl() {
            CacheHandle::Custom(Arc::new(ResolveCache::new(Some(ttl))))
        } else {
            CacheHandle::Process
        };
        let search = match &spec {
            HostSpec::Discover { name } => SearchOptions::for_name(name.as_deref()),
            HostSpec::Tcp { .. } => SearchOptions::default(),
        };
        Self {
            spec,
            config,
            cache,
            search,
        }
    }

    /// Share a cache across connectors, typically in tests.
    pub fn with_cache(mut self, cache: Arc<ResolveCache>) -> Self {
        self.cache = CacheHandle::Custom(cache);
        self
    }

    /// Point discovery somewhere other than the multicast default.
    pub fn with_search_options(mut self, search: SearchOptions) -> Self {
        self.search = search;
        self
    }

    async fn dial(&self, addr: SocketAddr) -> Result<Arc<dyn Transport>> {
        let transport =
            TcpTransport::connect(&addr.ip().to_string(), addr.port(), &self.config).await?;
        Ok(transport)
    }

    async fn resolve_and_dial(&self) -> Result<Arc<dyn Transport>> {
        let key = self
            .spec
            .cache_key()
            .unwrap_or_else(|| "dp://".to_string());

        if let Some(cache) = self.cache.get()
            && let Some(addr) = cache.get(&key)
        {
            debug!(%addr, "using cached discovery result");
            match self.dial(addr).await {
                Ok(transport) => return Ok(transport),
                Err(err) => {
                    // Stale entry; search again.
                    debug!(%addr, error = %err, "cached address unreachable");
                    cache.invalidate(&key);
                }
            }
        }

        let found = search_one(&self.search).await?;
        info!(addr = %found.tcp_addr, device = %found.device_name, "discovered receiver");
        if let Some(cache) = self.cache.get() {
            cache.insert(key, found.tcp_addr);
        }
        self.dial(found.tcp_addr).await
    }
}

#[async_trait]
impl Connector for GeneralConnector {
    async fn connect(&self) -> Result<Arc<dyn Transport>> {
        match &self.spec {
            HostSpec::Tcp { host, port } => {
                let port = port.unwrap_or(self.config.port);
                let transport = TcpTransport::connect(host, port, &self.config).await?;
                Ok(transport)
            }
            HostSpec::Discover { .. } => self.resolve_and_dial().await,
        }
    }
}
