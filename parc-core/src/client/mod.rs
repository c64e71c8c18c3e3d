//! Client side: configuration, transports, connectors, and the
//! high-level receiver client.

pub mod client;
pub mod config;
pub mod connector;
pub mod reconnect;
pub mod resolve;
pub mod tcp;
pub mod transport;

pub use client::ReceiverClient;
pub use config::ClientConfig;
pub use connector::{Connector, GeneralConnector, TcpConnector};
pub use reconnect::ReconnectTransport;
pub use resolve::{HostSpec, ResolveCache};
pub use tcp::{TcpTransport, TransportState};
pub use transport::{MultiTransactOutcome, Transport};
