//! BDD step definitions for session feature

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cucumber::gherkin::Step;
use cucumber::{given, then, when};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use firewatch::config::Config;
use firewatch::error::TransportError;
use firewatch::persistence::MemorySnapshotStore;
use firewatch::reading::SensorStatus;
use firewatch::session::{SessionBuilder, TelemetryEvent};
use firewatch::state::{BannerKind, ConnectionState};
use firewatch::transport::{Transport, TransportEvent};

use crate::world::FirewatchWorld;

/// Delivers a fixed script, then idles until cancelled
#[derive(Debug)]
struct ScriptedTransport {
    script: Mutex<Vec<TransportEvent>>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn describe(&self) -> String {
        "scripted".to_string()
    }

    async fn run(&self, sink: mpsc::Sender<TransportEvent>, cancel: CancellationToken) {
        let script: Vec<_> = self.script.lock().unwrap().drain(..).collect();
        for event in script {
            if sink.send(event).await.is_err() {
                return;
            }
        }
        cancel.cancelled().await;
    }
}

/// Sends the same reading until cancelled
#[derive(Debug)]
struct FloodTransport;

#[async_trait]
impl Transport for FloodTransport {
    fn describe(&self) -> String {
        "flood".to_string()
    }

    async fn run(&self, sink: mpsc::Sender<TransportEvent>, cancel: CancellationToken) {
        loop {
            let event = TransportEvent::Message {
                topic: "fire_detector/flood".to_string(),
                payload: br#"{"mac_address":"FF"}"#.to_vec(),
            };
            tokio::select! {
                _ = cancel.cancelled() => return,
                sent = sink.send(event) => if sent.is_err() { return },
            }
        }
    }
}

async fn build_with(world: &mut FirewatchWorld, transport: Arc<dyn Transport>) {
    // An empty snapshot keeps hydration quiet so events start with the transport.
    let mirror = Arc::new(MemorySnapshotStore::with_contents("{}"));
    let session = SessionBuilder::new(Config::default())
        .with_transport(transport)
        .with_snapshot_store(mirror)
        .build()
        .await
        .expect("session builds");
    world.events = Some(session.subscribe());
    world.session = Some(session);
}

#[given("a transport that delivers:")]
async fn scripted_transport(world: &mut FirewatchWorld, step: &Step) {
    let table = step.table.as_ref().expect("table required");
    let script = table
        .rows
        .iter()
        .skip(1)
        .map(|row| match row[0].as_str() {
            "connected" => TransportEvent::Connected,
            "error" => TransportEvent::Error(TransportError::Connection(row[1].clone())),
            "message" => TransportEvent::Message {
                topic: "fire_detector/test".to_string(),
                payload: row[1].as_bytes().to_vec(),
            },
            other => panic!("Unknown transport event: {}", other),
        })
        .collect();

    let transport = Arc::new(ScriptedTransport {
        script: Mutex::new(script),
    });
    build_with(world, transport).await;
}

#[given("a transport that floods messages")]
async fn flood_transport(world: &mut FirewatchWorld) {
    build_with(world, Arc::new(FloodTransport)).await;
}

#[when("the session is started")]
async fn start_session(world: &mut FirewatchWorld) {
    world
        .session
        .as_mut()
        .expect("session not built")
        .start()
        .await
        .expect("session starts");
}

#[when(expr = "{int} telemetry event(s) is/are received")]
async fn receive_events(world: &mut FirewatchWorld, count: usize) {
    let rx = world.events.as_mut().expect("not subscribed");
    for _ in 0..count {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event in time")
            .expect("channel open");
        world.received.push(event);
    }
}

#[when("the session is shut down")]
async fn shutdown_session(world: &mut FirewatchWorld) {
    let session = world.session.as_mut().expect("session not built");
    session.shutdown().await;
    let processed = session.state().read().await.messages_processed;
    world.processed_at_shutdown = Some(processed);

    // Collect anything published before shutdown returned.
    let rx = world.events.as_mut().expect("not subscribed");
    while let Ok(event) = rx.try_recv() {
        world.received.push(event);
    }
}

#[then(expr = "the connection state is {string}")]
async fn connection_state(world: &mut FirewatchWorld, expected: String) {
    let state = world.session.as_ref().expect("session not built").state();
    assert_eq!(state.read().await.connection.to_string(), expected);
}

#[then(expr = "the session store shows device {string} with smoke status {string}")]
async fn session_store_smoke(world: &mut FirewatchWorld, mac: String, status: String) {
    let state = world.session.as_ref().expect("session not built").state();
    let state = state.read().await;
    let reading = state.store.get(&mac).expect("device not stored");
    let expected = match status.as_str() {
        "Aman" => SensorStatus::Aman,
        "Terdeteksi" => SensorStatus::Terdeteksi,
        other => panic!("Unknown status: {}", other),
    };
    assert_eq!(reading.mq_status, expected);
}

#[then(expr = "the session store holds {int} device(s)")]
async fn session_store_count(world: &mut FirewatchWorld, count: usize) {
    let state = world.session.as_ref().expect("session not built").state();
    assert_eq!(state.read().await.store.len(), count);
}

#[then(expr = "exactly {int} {string} event(s) was/were received")]
fn exact_event_count(world: &mut FirewatchWorld, count: usize, kind: String) {
    let matching = world
        .received
        .iter()
        .filter(|event| match kind.as_str() {
            "normalization failed" => matches!(event, TelemetryEvent::NormalizationFailed { .. }),
            "reading stored" => matches!(event, TelemetryEvent::ReadingStored(_)),
            "transport failed" => matches!(event, TelemetryEvent::TransportFailed(_)),
            other => panic!("Unknown event kind: {}", other),
        })
        .count();
    assert_eq!(matching, count);
}

#[then(expr = "the banner shows a {string} condition")]
async fn banner_shows(world: &mut FirewatchWorld, kind: String) {
    let expected = match kind.as_str() {
        "transport" => BannerKind::Transport,
        "normalization" => BannerKind::Normalization,
        "persistence" => BannerKind::Persistence,
        other => panic!("Unknown banner kind: {}", other),
    };
    let state = world.session.as_ref().expect("session not built").state();
    let state = state.read().await;
    assert_eq!(state.banner.as_ref().expect("no banner").kind, expected);
}

#[then("no banner is shown")]
async fn no_banner(world: &mut FirewatchWorld) {
    let state = world.session.as_ref().expect("session not built").state();
    assert!(state.read().await.banner.is_none());
}

#[then("no further messages are processed")]
async fn nothing_after_shutdown(world: &mut FirewatchWorld) {
    let session = world.session.as_ref().expect("session not built");
    assert!(!session.is_running());
    tokio::time::sleep(Duration::from_millis(50)).await;
    let processed = session.state().read().await.messages_processed;
    assert_eq!(Some(processed), world.processed_at_shutdown);
    assert_eq!(
        session.state().read().await.connection,
        ConnectionState::Disconnected
    );
}
