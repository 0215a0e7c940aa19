//! WebSocket transport over tokio-tungstenite.

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use super::{Connection, Connector};
use crate::error::Result;

/// Connector producing [`WsConnection`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait::async_trait]
impl Connector for WsConnector {
    type Conn = WsConnection;

    async fn connect(&self, endpoint: &str) -> Result<WsConnection> {
        debug!("Opening WebSocket to {endpoint}");
        let (inner, _response) = connect_async(endpoint).await?;
        Ok(WsConnection { inner })
    }
}

/// One established WebSocket connection.
pub struct WsConnection {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait::async_trait]
impl Connection for WsConnection {
    async fn send(&mut self, text: String) -> Result<()> {
        self.inner.send(Message::Text(text)).await.map_err(Into::into)
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                // Pongs are generated by the library; the protocol itself is
                // text-only, so anything else is skipped.
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_)) => continue,
                Ok(Message::Close(_)) => return None,
                Ok(Message::Frame(_)) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.inner.close(None).await;
    }
}
