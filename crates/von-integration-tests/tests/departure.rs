//! Peers that leave politely, and peers that just vanish.

use von_geometry::{Position, SiteId};
use von_integration_tests::{init_tracing, World};
use von_peer::VonConfig;

/// A 4x3 grid with AOIs covering the grid spacing.
fn grid() -> World {
    let mut world = World::new(VonConfig::default());
    let mut id = 1;
    for row in 0..3 {
        for col in 0..4 {
            let position = Position::new(100.0 + col as f64 * 150.0, 100.0 + row as f64 * 150.0);
            world.spawn(id, position, 220.0).unwrap();
            world.run(15);
            id += 1;
        }
    }
    world.run(10);
    world
}

fn known_by(world: &World, id: SiteId) -> Vec<SiteId> {
    world
        .peers()
        .filter(|p| p.is_neighbor(id))
        .map(|p| p.id())
        .collect()
}

#[test]
fn grid_converges() {
    init_tracing();
    let world = grid();
    assert!(world.peers().all(|p| p.is_joined()));
    assert!(world.missing_enclosing().is_empty());
    assert!(world.missing_overlaps().is_empty());
}

#[test]
fn leaving_peer_is_forgotten() {
    init_tracing();
    let mut world = grid();
    let leaver = SiteId(6);
    assert!(!known_by(&world, leaver).is_empty());

    world.leave(leaver);
    world.run(2);

    assert!(world.peer(leaver).is_none());
    assert_eq!(known_by(&world, leaver), Vec::<SiteId>::new());
    assert!(world.missing_overlaps().is_empty());
}

#[test]
fn crashed_peer_is_evicted_on_first_failed_send() {
    init_tracing();
    let mut world = grid();
    let dead = SiteId(7);
    assert!(!known_by(&world, dead).is_empty());

    world.kill(dead);
    for id in world.ids() {
        let position = world.peer(id).unwrap().self_node().position();
        world
            .move_peer(id, Position::new(position.x + 0.5, position.y))
            .unwrap();
    }
    assert_eq!(known_by(&world, dead), Vec::<SiteId>::new());

    world.run(10);
    assert_eq!(known_by(&world, dead), Vec::<SiteId>::new());
    assert!(world.missing_overlaps().is_empty());
}
