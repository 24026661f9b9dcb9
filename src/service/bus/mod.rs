//! Message bus integration for mirk.
//!
//! Defines the `GenericBusClient` trait the relay consumes frames from, with a
//! default implementation for a ZeroMQ subscriber socket.

pub mod zmq;
pub mod zmtp;

use std::ops::{Deref, DerefMut};

use async_trait::async_trait;
use thiserror::Error;

use crate::base::types::Res;

// Errors.

/// Bus failures. All of them end the relay; a lost publisher is not reconnected.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Could not connect to bus endpoint `{endpoint}`: {message}")]
    Connect { endpoint: String, message: String },

    #[error("Bus handshake with `{endpoint}` failed: {message}")]
    Handshake { endpoint: String, message: String },

    #[error("Could not subscribe to `{topic}`: {message}")]
    Subscribe { topic: String, message: String },

    #[error("Bus receive failed: {message}")]
    Receive { message: String },
}

// Traits.

/// Generic "bus" trait that subscribers must implement.
#[async_trait]
pub trait GenericBusClient: Send + 'static {
    /// Block until the next multipart message arrives and return its raw parts.
    ///
    /// An error here means the subscription is gone.
    async fn recv(&mut self) -> Res<Vec<Vec<u8>>>;
}

// Structs.

/// Bus subscriber for the application.
///
/// Owned by the relay loop; receiving needs exclusive access, so this is not cloneable.
pub struct BusClient {
    inner: Box<dyn GenericBusClient>,
}

impl Deref for BusClient {
    type Target = dyn GenericBusClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl DerefMut for BusClient {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.inner
    }
}

impl BusClient {
    pub fn new(inner: Box<dyn GenericBusClient>) -> Self {
        Self { inner }
    }
}
