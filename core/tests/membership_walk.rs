//! Black-box replay of a multi-node connect/join/disconnect/leave scenario
//! against the public API only, as a regression guard independent of any
//! internal refactor inside `membership`/`node`/`registry`.

use shardnet_core::{Node, PeerAddress};
use std::collections::HashSet;
use std::time::Duration;

fn spin_up() -> (Node, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let node = Node::bind("127.0.0.1", 0, dir.path()).unwrap();
    (node, dir)
}

fn addr(n: &Node) -> PeerAddress {
    PeerAddress::new("127.0.0.1", n.local_addr().port())
}

fn wait() {
    std::thread::sleep(Duration::from_millis(300));
}

#[test]
fn five_node_scenario_converges() {
    use shardnet_core::membership::{join_network, leave_network, send_connect, send_disconnect};

    let (a, _da) = spin_up();
    let (b, _db) = spin_up();
    let (c, _dc) = spin_up();
    let (d, _dd) = spin_up();

    let (a_addr, b_addr, c_addr, d_addr) = (addr(&a), addr(&b), addr(&c), addr(&d));

    send_connect(b.registry(), &a_addr).unwrap();
    wait();
    assert!(a.registry().contains(&b_addr));
    assert!(b.registry().contains(&a_addr));

    join_network(c.registry(), b_addr.clone());
    wait();
    let known = |n: &Node| n.registry().snapshot().into_iter().collect::<HashSet<_>>();
    assert_eq!(known(&a), HashSet::from([b_addr.clone(), c_addr.clone()]));
    assert_eq!(known(&b), HashSet::from([a_addr.clone(), c_addr.clone()]));
    assert_eq!(known(&c), HashSet::from([a_addr.clone(), b_addr.clone()]));

    send_disconnect(b.registry(), &a_addr).unwrap();
    wait();
    assert!(!a.registry().contains(&b_addr));
    assert!(!b.registry().contains(&a_addr));

    join_network(d.registry(), b_addr.clone());
    wait();
    assert!(a.registry().contains(&d_addr));
    assert!(b.registry().contains(&d_addr));

    leave_network(c.registry());
    wait();
    assert!(c.registry().is_empty());
    assert!(!a.registry().contains(&c_addr));
    assert!(!b.registry().contains(&c_addr));

    a.shutdown();
    b.shutdown();
    c.shutdown();
    d.shutdown();
}

#[test]
fn join_then_leave_returns_registry_to_empty() {
    use shardnet_core::membership::{join_network, leave_network};

    let (seed, _ds) = spin_up();
    let (joiner, _dj) = spin_up();
    let seed_addr = addr(&seed);

    join_network(joiner.registry(), seed_addr.clone());
    wait();
    assert!(joiner.registry().contains(&seed_addr));
    assert!(seed.registry().contains(&addr(&joiner)));

    leave_network(joiner.registry());
    wait();
    assert!(joiner.registry().is_empty());
    assert!(!seed.registry().contains(&addr(&joiner)));

    joiner.shutdown();
    seed.shutdown();
}
