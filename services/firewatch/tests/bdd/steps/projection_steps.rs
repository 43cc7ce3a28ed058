//! BDD step definitions for projection feature

use cucumber::{given, then, when};

use firewatch::config::{Config, Coordinate, MissingCoordinates};
use firewatch::projector::{CardValue, DeviceCard, MapMarker, Projector};

use crate::world::FirewatchWorld;

fn cards(world: &FirewatchWorld) -> Vec<DeviceCard> {
    world.projector().project_cards(world.store())
}

fn markers(world: &FirewatchWorld) -> Vec<MapMarker> {
    world.projector().project_markers(world.store())
}

#[given("devices without a position are skipped")]
fn skip_missing(world: &mut FirewatchWorld) {
    let mut config = Config::default();
    config.map.missing_coordinates = MissingCoordinates::Skip;
    world.projector = Some(Projector::from_config(&config));
}

#[when("the store is projected")]
fn project(world: &mut FirewatchWorld) {
    // Projection is pure; make sure a projector exists for the assertions.
    if world.projector.is_none() {
        world.projector = Some(Projector::default());
    }
}

#[then(expr = "there is/are {int} card(s)")]
fn card_count(world: &mut FirewatchWorld, count: usize) {
    assert_eq!(cards(world).len(), count);
}

#[then(expr = "there is/are {int} marker(s)")]
fn marker_count(world: &mut FirewatchWorld, count: usize) {
    assert_eq!(markers(world).len(), count);
}

#[then(expr = "the card for {string} shows {string} as {string}")]
fn card_shows(world: &mut FirewatchWorld, mac: String, title: String, value: String) {
    let cards = cards(world);
    let card = cards
        .iter()
        .find(|c| c.mac_address == mac)
        .expect("card not found");
    assert_eq!(card.field(&title), Some(&CardValue::Text(value)));
}

#[then(expr = "there is a marker {string} at {float}, {float}")]
fn marker_at(world: &mut FirewatchWorld, title: String, latitude: f64, longitude: f64) {
    let markers = markers(world);
    let marker = markers
        .iter()
        .find(|m| m.title == title)
        .expect("marker not found");
    assert_eq!(marker.position, Coordinate::new(latitude, longitude));
}

#[then(expr = "the map is centered at {float}, {float}")]
fn map_centered(world: &mut FirewatchWorld, latitude: f64, longitude: f64) {
    let center = world.projector().project_map_center(world.store());
    assert_eq!(center, Coordinate::new(latitude, longitude));
}
