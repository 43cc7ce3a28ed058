//! BDD step definitions for ingestion feature

use std::sync::Arc;

use cucumber::{given, then, when};

use firewatch::persistence::MemorySnapshotStore;
use firewatch::reading::SensorStatus;
use firewatch::store::DeviceStateStore;

use crate::world::FirewatchWorld;

fn parse_status(s: &str) -> SensorStatus {
    match s {
        "Aman" => SensorStatus::Aman,
        "Terdeteksi" => SensorStatus::Terdeteksi,
        other => panic!("Unknown status: {}", other),
    }
}

fn ingest(world: &mut FirewatchWorld, payload: &str) {
    let result = DeviceStateStore::ingest(payload.as_bytes());
    if let Ok(Some(reading)) = &result {
        let upsert = world.store_mut().upsert(reading.clone());
        world.last_upsert = Some(upsert);
    }
    world.last_ingest = Some(result);
}

#[given("an empty device store")]
fn empty_store(world: &mut FirewatchWorld) {
    let mirror = Arc::new(MemorySnapshotStore::new());
    world.store = Some(DeviceStateStore::new(mirror.clone()));
    world.memory_mirror = Some(mirror);
}

#[given(regex = r"^the payload (.+) was ingested$")]
fn payload_was_ingested(world: &mut FirewatchWorld, payload: String) {
    ingest(world, &payload);
    assert!(
        matches!(world.last_ingest, Some(Ok(Some(_)))),
        "setup payload should be stored"
    );
}

#[when(regex = r"^the payload (.+) is ingested$")]
fn payload_is_ingested(world: &mut FirewatchWorld, payload: String) {
    ingest(world, &payload);
}

#[when(regex = r"^the payload (.+) is ingested again$")]
fn payload_is_ingested_again(world: &mut FirewatchWorld, payload: String) {
    world.snapshot_before = Some(serde_json::to_string(world.store().snapshot()).unwrap());
    world.mirror_before = world
        .memory_mirror
        .as_ref()
        .expect("mirror not set")
        .contents();
    ingest(world, &payload);
}

#[then(expr = "the store holds {int} device(s)")]
fn store_holds(world: &mut FirewatchWorld, count: usize) {
    assert_eq!(world.store().len(), count);
}

#[then(expr = "device {string} has temperature {float}")]
fn device_temperature(world: &mut FirewatchWorld, mac: String, temperature: f64) {
    let reading = world.store().get(&mac).expect("device not stored");
    assert_eq!(reading.temperature, Some(temperature));
}

#[then(expr = "device {string} has no temperature")]
fn device_no_temperature(world: &mut FirewatchWorld, mac: String) {
    let reading = world.store().get(&mac).expect("device not stored");
    assert_eq!(reading.temperature, None);
}

#[then(expr = "device {string} has humidity {float}")]
fn device_humidity(world: &mut FirewatchWorld, mac: String, humidity: f64) {
    let reading = world.store().get(&mac).expect("device not stored");
    assert_eq!(reading.humidity, Some(humidity));
}

#[then(expr = "device {string} has smoke status {string}")]
fn device_smoke(world: &mut FirewatchWorld, mac: String, status: String) {
    let reading = world.store().get(&mac).expect("device not stored");
    assert_eq!(reading.mq_status, parse_status(&status));
}

#[then(expr = "device {string} has flame status {string}")]
fn device_flame(world: &mut FirewatchWorld, mac: String, status: String) {
    let reading = world.store().get(&mac).expect("device not stored");
    assert_eq!(reading.flame_status, parse_status(&status));
}

#[then("the message was filtered")]
fn message_filtered(world: &mut FirewatchWorld) {
    assert!(matches!(world.last_ingest, Some(Ok(None))));
}

#[then("normalization failed")]
fn normalization_failed(world: &mut FirewatchWorld) {
    assert!(matches!(world.last_ingest, Some(Err(_))));
}

#[then("the store and its mirror are unchanged")]
fn store_and_mirror_unchanged(world: &mut FirewatchWorld) {
    let before = world.snapshot_before.as_ref().expect("pre-state not captured");
    assert_eq!(&serde_json::to_string(world.store().snapshot()).unwrap(), before);

    let mirrored = world
        .memory_mirror
        .as_ref()
        .expect("mirror not set")
        .contents();
    assert_eq!(mirrored, world.mirror_before);
    assert_eq!(mirrored.as_ref(), Some(before));
}
