//! Core library for controlling networked AV receivers.
//!
//! - [`protocol`]: packet framing, the command catalog, and model data
//! - [`client`]: transports, connectors, and the high-level client
//! - [`discovery`]: UDP broadcast discovery of receivers
//! - [`emulator`]: a receiver emulator for development and tests

pub mod client;
pub mod discovery;
pub mod emulator;
pub mod error;
pub mod protocol;

pub use client::{ClientConfig, ReceiverClient, Transport};
pub use error::{ParcError, Result};
