//! Integration tests for the session layer.
//!
//! These drive the full session task against the scripted mock connector and
//! verify lifecycle transitions, reconnect scheduling, and inbound routing.

use super::*;
use crate::state::{DetectionState, TelemetryHistory};
use crate::test_utils::{ConnectBehavior, MockConnection, MockConnector, MockRemote};
use std::time::Duration;
use tracing::info;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);
const RECONNECT_DELAY: Duration = Duration::from_millis(3000);

struct Harness {
    state: watch::Receiver<ConnectionState>,
    outbound: mpsc::Sender<ClientCommand>,
    detection: watch::Receiver<DetectionState>,
    history: watch::Receiver<TelemetryHistory>,
    slot: Arc<InFlightSlot>,
    cancel: CancellationToken,
}

fn spawn_session(connector: Arc<MockConnector>) -> Harness {
    let _ = tracing_subscriber::fmt::try_init();

    let (detection_tx, detection) = watch::channel(DetectionState::default());
    let (history_tx, history) = watch::channel(TelemetryHistory::new(20));
    // The demux only uses send_modify/send_replace, which work with no
    // live receiver, so the annotated receiver can drop immediately.
    let (annotated_tx, _) = watch::channel(None);

    let slot = Arc::new(InFlightSlot::new());
    let demux = crate::demux::Demultiplexer::new(
        detection_tx,
        history_tx,
        annotated_tx,
        Arc::clone(&slot),
    );
    let (outbound, outbound_rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    let channels = Session::spawn(
        connector,
        "ws://test.local/ws".to_string(),
        CONNECT_TIMEOUT,
        RECONNECT_DELAY,
        outbound_rx,
        demux,
        Arc::clone(&slot),
        cancel.clone(),
    );

    Harness { state: channels.state, outbound, detection, history, slot, cancel }
}

async fn wait_for_state(rx: &mut watch::Receiver<ConnectionState>, want: ConnectionState) {
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            if *rx.borrow_and_update() == want {
                return;
            }
            rx.changed().await.expect("session task dropped its state channel");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("session never reached {want:?}"));
}

fn scripted(behaviors: Vec<ConnectBehavior>) -> Arc<MockConnector> {
    MockConnector::new(behaviors)
}

fn open_pair() -> (ConnectBehavior, MockRemote) {
    let (conn, remote) = MockConnection::pair();
    (ConnectBehavior::Succeed(conn), remote)
}

#[tokio::test(start_paused = true)]
async fn connect_reaches_open_and_transmits_commands() {
    let (behavior, mut remote) = open_pair();
    let connector = scripted(vec![behavior]);
    let mut harness = spawn_session(Arc::clone(&connector));

    wait_for_state(&mut harness.state, ConnectionState::Open).await;
    assert_eq!(connector.attempts(), 1);

    harness
        .outbound
        .send(ClientCommand::ToggleFeature { feature: "Heatmap View".into(), value: true })
        .await
        .unwrap();

    let sent = remote.sent().await.expect("command should be transmitted");
    assert!(sent.contains(r#""action":"toggle_feature""#));
    assert!(sent.contains("Heatmap View"));

    harness.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn inbound_messages_route_to_shared_state() {
    let (behavior, remote) = open_pair();
    let connector = scripted(vec![behavior]);
    let mut harness = spawn_session(connector);

    wait_for_state(&mut harness.state, ConnectionState::Open).await;

    remote.push(r#"{"count": 5, "status": "OK"}"#);
    harness.detection.changed().await.unwrap();
    {
        let state = harness.detection.borrow_and_update();
        assert_eq!(state.count, 5);
        assert_eq!(state.risk, crate::protocol::RiskStatus::Normal);
    }

    remote.push(r#"{"count": 12, "status": "WARNING: high density"}"#);
    harness.detection.changed().await.unwrap();
    {
        let state = harness.detection.borrow_and_update();
        assert_eq!(state.count, 12);
        assert_eq!(state.risk, crate::protocol::RiskStatus::Warning);
    }

    assert_eq!(harness.history.borrow().len(), 2);
    harness.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn malformed_inbound_is_tolerated() {
    let (behavior, remote) = open_pair();
    let connector = scripted(vec![behavior]);
    let mut harness = spawn_session(connector);

    wait_for_state(&mut harness.state, ConnectionState::Open).await;

    remote.push("{definitely not json");
    remote.push(r#"{"count": 3}"#);

    harness.detection.changed().await.unwrap();
    assert_eq!(harness.detection.borrow().count, 3);
    assert!(harness.state.borrow().is_open());
    harness.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn disconnect_schedules_exactly_one_reconnect() {
    let (first, remote1) = open_pair();
    let (second, _remote2) = open_pair();
    let connector = scripted(vec![first, second]);
    let mut harness = spawn_session(Arc::clone(&connector));

    wait_for_state(&mut harness.state, ConnectionState::Open).await;
    info!("First connection open, dropping it");

    let lost_at = tokio::time::Instant::now();
    remote1.close();
    wait_for_state(&mut harness.state, ConnectionState::Closed).await;
    assert_eq!(connector.attempts(), 1, "no reconnect before the delay");

    wait_for_state(&mut harness.state, ConnectionState::Open).await;
    let waited = lost_at.elapsed();

    // Exactly one retry, and not before the fixed delay elapsed.
    assert_eq!(connector.attempts(), 2);
    assert!(waited >= RECONNECT_DELAY, "reconnected after {waited:?}");

    harness.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn connect_timeout_guard_fires_then_retries() {
    let (behavior, _remote) = open_pair();
    let connector = scripted(vec![ConnectBehavior::Hang, behavior]);
    let mut harness = spawn_session(Arc::clone(&connector));

    let started = tokio::time::Instant::now();

    // The hung attempt is abandoned by the guard, not by the peer.
    wait_for_state(&mut harness.state, ConnectionState::Closed).await;
    assert!(started.elapsed() >= CONNECT_TIMEOUT);
    assert_eq!(connector.attempts(), 1);

    // One fixed delay later the retry succeeds; the stale attempt never
    // produces a duplicate Open.
    wait_for_state(&mut harness.state, ConnectionState::Open).await;
    assert_eq!(connector.attempts(), 2);
    assert!(started.elapsed() >= CONNECT_TIMEOUT + RECONNECT_DELAY);

    harness.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn connect_failure_retries_after_the_fixed_delay() {
    let (behavior, _remote) = open_pair();
    let connector = scripted(vec![ConnectBehavior::Fail("refused".into()), behavior]);
    let mut harness = spawn_session(Arc::clone(&connector));

    wait_for_state(&mut harness.state, ConnectionState::Open).await;
    assert_eq!(connector.attempts(), 2);

    harness.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn reconnect_resets_the_inflight_slot() {
    let (first, remote1) = open_pair();
    let (second, _remote2) = open_pair();
    let connector = scripted(vec![first, second]);
    let mut harness = spawn_session(connector);

    wait_for_state(&mut harness.state, ConnectionState::Open).await;
    assert!(harness.slot.try_begin(Duration::from_secs(30)).granted());
    assert!(harness.slot.is_busy());

    remote1.close();
    wait_for_state(&mut harness.state, ConnectionState::Closed).await;
    wait_for_state(&mut harness.state, ConnectionState::Open).await;

    // In-flight accounting does not survive the reconnect.
    assert!(!harness.slot.is_busy());

    harness.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn shared_state_survives_a_disconnect() {
    let (first, remote1) = open_pair();
    let (second, _remote2) = open_pair();
    let connector = scripted(vec![first, second]);
    let mut harness = spawn_session(connector);

    wait_for_state(&mut harness.state, ConnectionState::Open).await;
    remote1.push(r#"{"count": 7, "status": "OK"}"#);
    harness.detection.changed().await.unwrap();

    remote1.close();
    wait_for_state(&mut harness.state, ConnectionState::Closed).await;

    // No flicker to empty during the outage.
    assert_eq!(harness.detection.borrow_and_update().count, 7);
    assert_eq!(harness.history.borrow().len(), 1);

    harness.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_closes_the_session() {
    let (behavior, _remote) = open_pair();
    let connector = scripted(vec![behavior]);
    let mut harness = spawn_session(connector);

    wait_for_state(&mut harness.state, ConnectionState::Open).await;

    let Harness { state, outbound, cancel: _cancel, .. } = harness;
    drop(outbound);

    let mut state = state;
    wait_for_state(&mut state, ConnectionState::Closed).await;
}
