//! Transport traits for the duplex channel.
//!
//! A [`Connector`] produces a fresh [`Connection`] for every attempt — the
//! session never reuses a connection object across reconnects, so a failed
//! or abandoned attempt can simply be dropped.

mod ws;

pub use ws::{WsConnection, WsConnector};

use crate::error::Result;

/// Factory for duplex connections.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    type Conn: Connection;

    /// Open a new connection to the endpoint.
    async fn connect(&self, endpoint: &str) -> Result<Self::Conn>;
}

/// A single established duplex connection carrying text messages.
#[async_trait::async_trait]
pub trait Connection: Send + 'static {
    /// Transmit one text message.
    async fn send(&mut self, text: String) -> Result<()>;

    /// Receive the next text message.
    ///
    /// Returns:
    /// - `Some(Ok(text))` - a message arrived
    /// - `Some(Err(e))` - the connection failed
    /// - `None` - the peer closed cleanly
    async fn recv(&mut self) -> Option<Result<String>>;

    /// Close the connection. Best-effort; errors are ignored.
    async fn close(&mut self);
}
