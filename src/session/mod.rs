//! Transport session: connection lifecycle and reconnection.
//!
//! The session task is the only owner of a live connection. Its loop
//! structure is the concurrency argument: one connect attempt at a time
//! (guarded by `tokio::time::timeout`, so an abandoned half-open attempt is
//! dropped and can never resolve late), and exactly one reconnect sleep per
//! disconnect (there is no spawned timer to stack).
//!
//! State transitions go through [`ConnectionState::apply`], which is total —
//! defined for every state/event pair — so stale or repeated callbacks can
//! never move the machine somewhere undeclared.

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::demux::Demultiplexer;
use crate::inflight::InFlightSlot;
use crate::protocol::ClientCommand;
use crate::transport::{Connection, Connector};

/// Externally observable lifecycle state of the transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Named events driving the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A connect attempt is starting (initial or retry).
    ConnectRequested,
    /// The underlying connection reached open.
    Opened,
    /// The connect-timeout guard fired before open.
    ConnectTimedOut,
    /// The connection errored or the peer closed.
    Lost,
    /// The local side is shutting the session down.
    CloseRequested,
}

impl ConnectionState {
    /// Apply one event. Total: every state/event pair is defined, and pairs
    /// with no declared transition leave the state unchanged, so a stale
    /// callback (e.g. an Opened arriving after the guard already fired)
    /// is a no-op rather than a duplicate transition.
    pub fn apply(self, event: SessionEvent) -> ConnectionState {
        use ConnectionState::*;
        use SessionEvent::*;
        match (self, event) {
            (Idle | Closed, ConnectRequested) => Connecting,
            (Connecting, Opened) => Open,
            (Connecting, ConnectTimedOut | Lost) => Closed,
            (Open, Lost) => Closed,
            (Open | Connecting | Idle, CloseRequested) => Closing,
            (Closing, Lost | ConnectTimedOut) => Closed,
            (state, _) => state,
        }
    }

    pub fn is_open(self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

/// Receivers produced by spawning the session task.
pub(crate) struct SessionChannels {
    pub state: watch::Receiver<ConnectionState>,
}

/// Spawns and manages the transport session task.
pub(crate) struct Session;

/// Why the open phase ended.
enum OpenExit {
    Lost,
    HandleClosed,
    Cancelled,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn spawn<C>(
        connector: C,
        endpoint: String,
        connect_timeout: Duration,
        reconnect_delay: Duration,
        outbound_rx: mpsc::Receiver<ClientCommand>,
        demux: Demultiplexer,
        slot: Arc<InFlightSlot>,
        cancel: CancellationToken,
    ) -> SessionChannels
    where
        C: Connector,
    {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);

        tokio::spawn(async move {
            Self::session_task(
                connector,
                endpoint,
                connect_timeout,
                reconnect_delay,
                outbound_rx,
                demux,
                slot,
                state_tx,
                cancel,
            )
            .await;
        });

        SessionChannels { state: state_rx }
    }

    #[allow(clippy::too_many_arguments)]
    async fn session_task<C>(
        connector: C,
        endpoint: String,
        connect_timeout: Duration,
        reconnect_delay: Duration,
        mut outbound_rx: mpsc::Receiver<ClientCommand>,
        demux: Demultiplexer,
        slot: Arc<InFlightSlot>,
        state_tx: watch::Sender<ConnectionState>,
        cancel: CancellationToken,
    ) where
        C: Connector,
    {
        let mut state = ConnectionState::Idle;
        let transition = |state: &mut ConnectionState, event: SessionEvent| {
            let next = state.apply(event);
            debug!("Session {:?} --{:?}--> {:?}", state, event, next);
            *state = next;
            state_tx.send_replace(next);
        };

        info!("Session task started for {endpoint}");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            transition(&mut state, SessionEvent::ConnectRequested);
            info!("Connecting to {endpoint}");

            let attempt = tokio::select! {
                _ = cancel.cancelled() => break,
                attempt = tokio::time::timeout(connect_timeout, connector.connect(&endpoint)) => attempt,
            };

            match attempt {
                Ok(Ok(mut conn)) => {
                    transition(&mut state, SessionEvent::Opened);
                    // In-flight accounting does not survive a reconnect.
                    slot.reset();
                    info!("Connection open, streaming ready");

                    let exit =
                        Self::drive_open(&mut conn, &mut outbound_rx, &demux, &cancel).await;
                    conn.close().await;

                    match exit {
                        OpenExit::Cancelled => break,
                        OpenExit::HandleClosed => {
                            transition(&mut state, SessionEvent::CloseRequested);
                            transition(&mut state, SessionEvent::Lost);
                            info!("Client handle dropped, session closed");
                            return;
                        }
                        OpenExit::Lost => {
                            transition(&mut state, SessionEvent::Lost);
                            warn!("Connection lost, retrying in {:?}", reconnect_delay);
                        }
                    }
                }
                Ok(Err(e)) => {
                    transition(&mut state, SessionEvent::Lost);
                    warn!("Connect failed: {e}; retrying in {:?}", reconnect_delay);
                }
                Err(_) => {
                    // Distinct from a normal close: the attempt never reached
                    // open. The half-open socket future was dropped above, so
                    // it cannot deliver a late Opened.
                    transition(&mut state, SessionEvent::ConnectTimedOut);
                    warn!(
                        "Connect attempt exceeded {:?} guard, abandoning half-open socket; retrying in {:?}",
                        connect_timeout, reconnect_delay
                    );
                }
            }

            // Exactly one reconnect sleep per disconnect.
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(reconnect_delay) => {}
            }
        }

        transition(&mut state, SessionEvent::CloseRequested);
        transition(&mut state, SessionEvent::Lost);
        info!("Session task ended");
    }

    /// Pump the open connection until it is lost, the handle goes away, or
    /// the session is cancelled.
    async fn drive_open<C>(
        conn: &mut C,
        outbound_rx: &mut mpsc::Receiver<ClientCommand>,
        demux: &Demultiplexer,
        cancel: &CancellationToken,
    ) -> OpenExit
    where
        C: Connection,
    {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return OpenExit::Cancelled,
                cmd = outbound_rx.recv() => match cmd {
                    Some(cmd) => match serde_json::to_string(&cmd) {
                        Ok(text) => {
                            if let Err(e) = conn.send(text).await {
                                warn!("Send failed, message dropped: {e}");
                                return OpenExit::Lost;
                            }
                        }
                        Err(e) => warn!("Unserializable command dropped: {e}"),
                    },
                    None => return OpenExit::HandleClosed,
                },
                inbound = conn.recv() => match inbound {
                    Some(Ok(text)) => demux.handle_text(&text),
                    Some(Err(e)) => {
                        warn!("Receive failed: {e}");
                        return OpenExit::Lost;
                    }
                    None => {
                        info!("Server closed the connection");
                        return OpenExit::Lost;
                    }
                },
            }
        }
    }
}
