//! UDP broadcast discovery of receivers on the local network.

pub mod client;
pub mod datagram;
pub mod server;
pub mod socket;

pub use client::{search, search_one, DiscoveredReceiver, SearchOptions};
pub use datagram::{DpDatagram, DP_DATAGRAM_LEN, DP_HEADER, DP_VERSION};
pub use server::{DpServer, ServerOptions};
pub use socket::{DpBinding, DpMessage, DpSocket, DpSubscriber};
