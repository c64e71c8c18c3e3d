//! Transport abstraction.
//!
//! A transport owns one control channel to a receiver and serializes
//! transactions over it: exactly one command/response exchange runs at
//! a time, and a batch submitted together runs back-to-back without
//! another caller interleaving.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ParcError, Result};
use crate::protocol::command::{Command, Response};

/// Outcome of a batched transaction.
///
/// A batch stops at the first failing command; the responses gathered
/// before the failure are preserved alongside the error.
#[derive(Debug, Clone)]
pub struct MultiTransactOutcome {
    pub responses: Vec<Response>,
    pub error: Option<Arc<ParcError>>,
}

impl MultiTransactOutcome {
    pub fn success(responses: Vec<Response>) -> Self {
        Self {
            responses,
            error: None,
        }
    }

    pub fn failure(responses: Vec<Response>, error: ParcError) -> Self {
        Self {
            responses,
            error: Some(Arc::new(error)),
        }
    }

    /// Re-raise the stored error, or yield all responses.
    pub fn into_result(self) -> Result<Vec<Response>> {
        match self.error {
            Some(error) => Err(ParcError::shared(&error)),
            None => Ok(self.responses),
        }
    }
}

/// A serialized command/response channel to one receiver.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Run one command/response exchange, holding the transaction lock
    /// for its duration.
    async fn transact(&self, command: Command) -> Result<Response>;

    /// Run several exchanges under a single hold of the transaction
    /// lock, stopping at the first failure.
    async fn transact_many(&self, commands: Vec<Command>) -> MultiTransactOutcome;

    /// Tear the transport down. Later calls observe the stored reason;
    /// shutting down twice keeps the first reason.
    async fn shut_down(&self, reason: Option<ParcError>);

    /// Whether the transport has been shut down.
    fn is_shut_down(&self) -> bool;

    /// Wait until the transport shuts down, returning the reason if it
    /// went down with an error.
    async fn wait_shut_down(&self) -> Option<Arc<ParcError>>;
}
