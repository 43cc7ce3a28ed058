//! BDD step definitions for dashboard feature

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use cucumber::{given, then, when};
use tower::ServiceExt;

use firewatch::dashboard::build_router;
use firewatch::persistence::MemorySnapshotStore;
use firewatch::projector::Projector;
use firewatch::state::{new_state_handle, BannerKind};
use firewatch::store::DeviceStateStore;

use crate::world::FirewatchWorld;

#[given("a dashboard over an empty device store")]
fn dashboard_over_empty_store(world: &mut FirewatchWorld) {
    let store = DeviceStateStore::new(Arc::new(MemorySnapshotStore::new()));
    world.dashboard_state = Some(new_state_handle(store));
}

#[given(regex = r"^the dashboard store received (.+)$")]
async fn dashboard_store_received(world: &mut FirewatchWorld, payload: String) {
    let handle = world.dashboard_state.as_ref().expect("state not set");
    let reading = DeviceStateStore::ingest(payload.as_bytes())
        .expect("valid payload")
        .expect("not filtered");
    handle.write().await.store.upsert(reading).unwrap();
}

#[given(expr = "the dashboard banner says {string}")]
async fn dashboard_banner(world: &mut FirewatchWorld, message: String) {
    let handle = world.dashboard_state.as_ref().expect("state not set");
    handle
        .write()
        .await
        .raise(BannerKind::Transport, message, 1000);
}

#[when(expr = "{string} is requested")]
async fn request(world: &mut FirewatchWorld, uri: String) {
    let state = world
        .dashboard_state
        .as_ref()
        .expect("state not set")
        .clone();
    let app = build_router(state, Arc::new(Projector::default()));
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    world.response_status = Some(response.status().as_u16());
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    world.response_body = Some(String::from_utf8(body.to_vec()).unwrap());
}

#[then(expr = "the response status is {int}")]
fn response_status(world: &mut FirewatchWorld, status: u16) {
    assert_eq!(world.response_status, Some(status));
}

#[then(expr = "the response body contains {string}")]
fn response_contains(world: &mut FirewatchWorld, needle: String) {
    let body = world.response_body.as_ref().expect("no response");
    assert!(body.contains(&needle), "{needle} not in {body}");
}

#[then(expr = "the JSON response has {int} entry/entries")]
fn json_entries(world: &mut FirewatchWorld, count: usize) {
    let body = world.response_body.as_ref().expect("no response");
    let json: Vec<serde_json::Value> = serde_json::from_str(body).unwrap();
    assert_eq!(json.len(), count);
}
