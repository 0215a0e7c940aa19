//! Shared test doubles: a scripted connector and a deterministic frame source.
//!
//! These stand in for the real WebSocket endpoint and camera device so the
//! protocol core can be exercised without either.

#![cfg(any(test, feature = "benchmark"))]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::{ClientError, Result};
use crate::source::{FrameSource, RawFrame};
use crate::transport::{Connection, Connector};

/// How one scripted connect attempt behaves.
pub enum ConnectBehavior {
    /// Hand out this connection.
    Succeed(MockConnection),
    /// Fail immediately with the given reason.
    Fail(String),
    /// Never resolve; exercises the connect-timeout guard.
    Hang,
}

/// Connector that plays back a queue of [`ConnectBehavior`]s.
///
/// Once the queue is exhausted every further attempt hangs, so tests can
/// assert an exact number of attempts.
pub struct MockConnector {
    script: Mutex<VecDeque<ConnectBehavior>>,
    attempts: AtomicUsize,
}

impl MockConnector {
    pub fn new(script: Vec<ConnectBehavior>) -> Arc<Self> {
        Arc::new(Self { script: Mutex::new(script.into()), attempts: AtomicUsize::new(0) })
    }

    /// Number of connect attempts observed so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Connector for Arc<MockConnector> {
    type Conn = MockConnection;

    async fn connect(&self, _endpoint: &str) -> Result<MockConnection> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let behavior = self.script.lock().unwrap().pop_front();
        match behavior {
            Some(ConnectBehavior::Succeed(conn)) => Ok(conn),
            Some(ConnectBehavior::Fail(reason)) => Err(ClientError::transport_failed(reason)),
            Some(ConnectBehavior::Hang) | None => {
                futures::future::pending::<()>().await;
                unreachable!("pending future resolved")
            }
        }
    }
}

/// Test-side controls for a [`MockConnection`].
pub struct MockRemote {
    inbound_tx: mpsc::UnboundedSender<Result<String>>,
    sent_rx: mpsc::UnboundedReceiver<String>,
}

impl MockRemote {
    /// Deliver a message to the client.
    pub fn push(&self, text: impl Into<String>) {
        let _ = self.inbound_tx.send(Ok(text.into()));
    }

    /// Deliver a receive error to the client.
    pub fn push_error(&self, reason: impl Into<String>) {
        let _ = self.inbound_tx.send(Err(ClientError::transport_failed(reason)));
    }

    /// Close the connection from the server side.
    pub fn close(self) {
        drop(self.inbound_tx);
    }

    /// Await the next message the client transmitted.
    pub async fn sent(&mut self) -> Option<String> {
        self.sent_rx.recv().await
    }

    /// Drain whatever the client has transmitted so far.
    pub fn drain_sent(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(text) = self.sent_rx.try_recv() {
            out.push(text);
        }
        out
    }
}

/// In-memory [`Connection`] backed by channels.
pub struct MockConnection {
    inbound_rx: mpsc::UnboundedReceiver<Result<String>>,
    sent_tx: mpsc::UnboundedSender<String>,
}

impl MockConnection {
    /// Create a connection plus the remote controls for it.
    pub fn pair() -> (MockConnection, MockRemote) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        (MockConnection { inbound_rx, sent_tx }, MockRemote { inbound_tx, sent_rx })
    }
}

#[async_trait::async_trait]
impl Connection for MockConnection {
    async fn send(&mut self, text: String) -> Result<()> {
        self.sent_tx.send(text).map_err(|_| ClientError::transport_failed("peer gone"))
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        self.inbound_rx.recv().await
    }

    async fn close(&mut self) {}
}

/// Deterministic frame source yielding a moving gradient pattern.
pub struct TestPatternSource {
    width: u32,
    height: u32,
    remaining: Option<u64>,
    seq: u64,
}

impl TestPatternSource {
    /// A source that yields `count` frames, then ends.
    pub fn new(width: u32, height: u32, count: u64) -> Self {
        Self { width, height, remaining: Some(count), seq: 0 }
    }

    /// A source that never ends.
    pub fn endless(width: u32, height: u32) -> Self {
        Self { width, height, remaining: None, seq: 0 }
    }
}

#[async_trait::async_trait]
impl FrameSource for TestPatternSource {
    async fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        // Pace like a real camera so watch-channel consumers keep up.
        tokio::time::sleep(Duration::from_millis(33)).await;

        if let Some(remaining) = &mut self.remaining {
            if *remaining == 0 {
                return Ok(None);
            }
            *remaining -= 1;
        }

        let frame = test_frame(self.width, self.height, self.seq);
        self.seq += 1;
        Ok(Some(frame))
    }

    fn frame_rate(&self) -> f64 {
        30.0
    }
}

/// Build a single gradient frame.
pub fn test_frame(width: u32, height: u32, seq: u64) -> RawFrame {
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height {
        for x in 0..width {
            pixels.push((x % 256) as u8);
            pixels.push((y % 256) as u8);
            pixels.push((seq % 256) as u8);
        }
    }
    RawFrame::new(width, height, pixels, seq).expect("gradient buffer matches dimensions")
}
