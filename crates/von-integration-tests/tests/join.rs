//! Joining: bootstrap, greedy QUERY routing, and convergence of the
//! enclosing and overlap invariants over sequential joins.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use von_geometry::{Position, SiteId};
use von_integration_tests::{init_tracing, World};
use von_peer::{PeerState, VonConfig};

#[test]
fn second_peer_converges_with_gateway() {
    init_tracing();
    let mut world = World::new(VonConfig::default());

    let g = world.spawn(1, Position::new(0.0, 0.0), 50.0).unwrap();
    assert_eq!(world.peer(g).unwrap().state(), PeerState::Joined);
    assert_eq!(world.peer(g).unwrap().neighbor_count(), 0);

    let p = world.spawn(2, Position::new(10.0, 10.0), 50.0).unwrap();
    assert_eq!(world.peer(p).unwrap().state(), PeerState::Joining);

    world.run(5);

    let gateway = world.peer(g).unwrap();
    let joiner = world.peer(p).unwrap();
    assert!(joiner.is_joined());
    assert_eq!(joiner.state(), PeerState::Joined);
    assert!(gateway.is_neighbor(p));
    assert!(joiner.is_neighbor(g));
    assert_eq!(gateway.neighbor_count(), 1);
    assert_eq!(joiner.neighbor_count(), 1);
    assert!(world.missing_enclosing().is_empty());
    assert!(world.hub().messages_sent() > 0);
}

#[test]
fn triangle_peers_learn_each_other_through_enclosure() {
    init_tracing();
    let mut world = World::new(VonConfig::default());

    // 100 apart with radius 30: only enclosure links the base corners.
    world.spawn(1, Position::new(0.0, 0.0), 30.0).unwrap();
    world.run(3);
    world.spawn(2, Position::new(100.0, 0.0), 30.0).unwrap();
    world.run(10);
    world.spawn(3, Position::new(50.0, 50.0), 30.0).unwrap();
    world.run(10);

    for id in world.ids() {
        let peer = world.peer(id).unwrap();
        assert!(peer.is_joined(), "peer {id} not joined");
        assert_eq!(peer.neighbor_count(), 2, "peer {id} neighbors");
    }
    assert!(world.missing_enclosing().is_empty());
}

#[test]
fn sequential_joins_satisfy_both_invariants() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(0x5EED);
    let mut world = World::new(VonConfig::default());

    for id in 1..=20u64 {
        let position = Position::new(rng.gen_range(0.0..1000.0), rng.gen_range(0.0..1000.0));
        world.spawn(id, position, 200.0).unwrap();
        world.run(20);
    }
    world.run(20);

    for peer in world.peers() {
        assert!(peer.is_joined(), "peer {} not joined", peer.id());
    }
    assert_eq!(world.missing_enclosing(), Vec::<(SiteId, SiteId)>::new());
    assert_eq!(world.missing_overlaps(), Vec::<(SiteId, SiteId)>::new());
}

#[test]
fn query_is_routed_to_the_owner() {
    init_tracing();
    let mut world = World::new(VonConfig::default());

    // A line of peers, far apart, with small AOIs.
    for (i, x) in [0.0, 300.0, 600.0, 900.0].into_iter().enumerate() {
        world.spawn(i as u64 + 1, Position::new(x, 0.0), 20.0).unwrap();
        world.run(10);
    }
    // Joins through peer 1 but lands next to peer 4.
    let late = world.spawn(9, Position::new(950.0, 0.0), 20.0).unwrap();
    world.run(10);

    let peer = world.peer(late).unwrap();
    assert!(peer.is_joined());
    assert!(peer.is_neighbor(SiteId(4)));
    assert!(!peer.is_neighbor(SiteId(1)));
    assert!(world.peer(SiteId(4)).unwrap().is_neighbor(late));
    assert!(world.missing_enclosing().is_empty());
}
