//! BDD step definitions for persistence feature

use std::sync::Arc;

use cucumber::{given, then, when};

use firewatch::error::PersistenceError;
use firewatch::persistence::{FileSnapshotStore, MemorySnapshotStore};
use firewatch::store::DeviceStateStore;

use crate::world::FirewatchWorld;

const SLOT: &str = "sensorMapCache";

fn file_mirror(world: &FirewatchWorld) -> Arc<FileSnapshotStore> {
    let dir = world.data_dir.as_ref().expect("data dir not set");
    Arc::new(FileSnapshotStore::new(dir.path(), SLOT))
}

#[given("a fresh data directory")]
fn fresh_data_dir(world: &mut FirewatchWorld) {
    world.data_dir = Some(tempfile::tempdir().unwrap());
}

#[given(expr = "a fresh data directory containing the snapshot {string}")]
fn data_dir_with_snapshot(world: &mut FirewatchWorld, contents: String) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(format!("{}.json", SLOT)), contents).unwrap();
    world.data_dir = Some(dir);
}

#[given("a file-backed device store in a fresh data directory")]
fn file_backed_store(world: &mut FirewatchWorld) {
    fresh_data_dir(world);
    let mirror = file_mirror(world);
    world.store = Some(DeviceStateStore::new(mirror.clone()));
    world.file_mirror = Some(mirror);
}

#[given("an empty device store whose mirror rejects writes")]
fn store_with_failing_mirror(world: &mut FirewatchWorld) {
    let mirror = Arc::new(MemorySnapshotStore::new());
    mirror.set_fail_writes(true);
    world.store = Some(DeviceStateStore::new(mirror.clone()));
    world.memory_mirror = Some(mirror);
}

#[given(regex = r"^the payload (.+) was stored$")]
fn payload_was_stored(world: &mut FirewatchWorld, payload: String) {
    let reading = DeviceStateStore::ingest(payload.as_bytes())
        .expect("valid payload")
        .expect("not filtered");
    world
        .store_mut()
        .upsert(reading)
        .expect("mirror write should succeed");
}

#[when("the store is hydrated from the data directory")]
fn hydrate(world: &mut FirewatchWorld) {
    let (store, warning) = DeviceStateStore::hydrate(file_mirror(world));
    world.hydrate_warning = warning;
    // Keep the original snapshot for comparison.
    world.snapshot_before = world
        .store
        .as_ref()
        .map(|s| serde_json::to_string(s.snapshot()).unwrap());
    world.store = Some(store);
}

#[then("no hydration warning is reported")]
fn no_warning(world: &mut FirewatchWorld) {
    assert!(world.hydrate_warning.is_none(), "{:?}", world.hydrate_warning);
}

#[then(expr = "a {string} hydration warning is reported")]
fn warning_reported(world: &mut FirewatchWorld, kind: String) {
    let warning = world.hydrate_warning.as_ref().expect("no warning");
    match kind.as_str() {
        "not found" => assert!(matches!(warning, PersistenceError::NotFound(_))),
        "malformed" => assert!(matches!(warning, PersistenceError::Malformed(_))),
        other => panic!("Unknown warning kind: {}", other),
    }
}

#[then("the hydrated store equals the original store")]
fn hydrated_equals_original(world: &mut FirewatchWorld) {
    let original = world.snapshot_before.as_ref().expect("no original store");
    assert_eq!(&serde_json::to_string(world.store().snapshot()).unwrap(), original);
}

#[then("the hydrated store is empty")]
fn hydrated_empty(world: &mut FirewatchWorld) {
    assert!(world.store().is_empty());
}

#[then("the mirror write failed")]
fn mirror_write_failed(world: &mut FirewatchWorld) {
    assert!(matches!(
        world.last_upsert,
        Some(Err(PersistenceError::Write(_)))
    ));
}
