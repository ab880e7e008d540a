//! Membership protocol: PING, CONNECT, DISCONNECT, GET_PEERS, and the
//! JOIN/LEAVE gossip walk built on top of them.

use crate::net::{connect, DEFAULT_TIMEOUT};
use crate::registry::{PeerAddress, PeerRegistry};
use crate::wire::{self, WireError};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::io::{self, Write};

#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    #[error("refusing to {0} own address")]
    SelfContact(&'static str),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
}

/// Used only as the shutdown unblock trick: points a PING at the node's
/// own listener so a pending `accept()` returns.
pub fn send_ping(peer: &PeerAddress) -> Result<(), MembershipError> {
    let mut stream = connect(peer, DEFAULT_TIMEOUT)?;
    stream.write_all(&wire::encode_ping())?;
    Ok(())
}

/// Connects to `p`, telling it this node's own address, and adds `p` to
/// the local registry on success. The remote symmetrically adds the
/// sender via its CONNECT handler.
pub fn send_connect(registry: &PeerRegistry, p: &PeerAddress) -> Result<(), MembershipError> {
    if p == registry.me() {
        return Err(MembershipError::SelfContact("connect to"));
    }
    let mut stream = connect(p, DEFAULT_TIMEOUT)?;
    let me = registry.me();
    stream.write_all(&wire::encode_connect(&me.host, me.port))?;
    registry.add(p.clone());
    info!("connected to {p}");
    Ok(())
}

/// Sends DISCONNECT to `p`. Per the source's (preserved, possibly buggy)
/// behavior, the local registry entry is removed only after the send
/// succeeds; a failed send leaves the entry in place and is logged.
pub fn send_disconnect(registry: &PeerRegistry, p: &PeerAddress) -> Result<(), MembershipError> {
    if p == registry.me() {
        return Err(MembershipError::SelfContact("disconnect from"));
    }
    let me = registry.me();
    match connect(p, DEFAULT_TIMEOUT).and_then(|mut stream| {
        stream.write_all(&wire::encode_disconnect(&me.host, me.port))
    }) {
        Ok(()) => {
            registry.remove(p);
            info!("disconnected from {p}");
            Ok(())
        }
        Err(e) => {
            warn!("disconnect send to {p} failed, leaving registry entry in place: {e}");
            Err(e.into())
        }
    }
}

/// Fetches `p`'s current peer listing, bounded by `connect`'s default
/// 10s timeout so a stalled peer can't hang the caller indefinitely.
pub fn send_get_peers(
    registry: &PeerRegistry,
    p: &PeerAddress,
) -> Result<HashSet<PeerAddress>, MembershipError> {
    if p == registry.me() {
        return Err(MembershipError::SelfContact("get-peers from"));
    }
    let mut stream = connect(p, DEFAULT_TIMEOUT)?;
    stream.write_all(&wire::encode_get_peers())?;
    let body = wire::read_response_field(&mut stream)?;
    let parsed = wire::parse_peer_listing(&body)?;
    Ok(parsed
        .into_iter()
        .map(|(host, port)| PeerAddress::new(host, port))
        .collect())
}

/// Breadth-first gossip walk starting from `seed`: CONNECT + GET_PEERS at
/// each frontier peer, folding newly-discovered peers into the next
/// frontier. Terminates because the frontier shrinks to peers not yet
/// visited and not already known. A failed peer is skipped, not fatal.
pub fn join_network(registry: &PeerRegistry, seed: PeerAddress) {
    let mut visited: HashSet<PeerAddress> = HashSet::new();
    let mut frontier: HashSet<PeerAddress> = HashSet::from([seed]);

    while !frontier.is_empty() {
        let mut next = HashSet::new();
        for p in &frontier {
            visited.insert(p.clone());
            if p == registry.me() {
                continue;
            }
            match send_connect(registry, p) {
                Ok(()) => {}
                Err(e) => {
                    debug!("join_network: connect to {p} failed, skipping: {e}");
                    continue;
                }
            }
            match send_get_peers(registry, p) {
                Ok(peers) => next.extend(peers),
                Err(e) => debug!("join_network: get-peers from {p} failed: {e}"),
            }
        }
        let known = registry.snapshot().into_iter().collect::<HashSet<_>>();
        frontier = next
            .into_iter()
            .filter(|p| !visited.contains(p) && !known.contains(p) && p != registry.me())
            .collect();
    }
}

/// Best-effort DISCONNECT to every currently-known peer.
pub fn leave_network(registry: &PeerRegistry) {
    for p in registry.snapshot() {
        if let Err(e) = send_disconnect(registry, &p) {
            debug!("leave_network: disconnect from {p} failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    fn spin_up() -> (Node, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let node = Node::bind("127.0.0.1", 0, dir.path()).unwrap();
        (node, dir)
    }

    #[test]
    fn connect_is_symmetric() {
        let (a, _da) = spin_up();
        let (b, _db) = spin_up();

        let a_addr = PeerAddress::new("127.0.0.1", a.local_addr().port());
        send_connect(b.registry(), &a_addr).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(200));

        let b_addr = PeerAddress::new("127.0.0.1", b.local_addr().port());
        assert!(b.registry().contains(&a_addr));
        assert!(a.registry().contains(&b_addr));

        a.shutdown();
        b.shutdown();
    }

    #[test]
    fn disconnect_removes_both_sides() {
        let (a, _da) = spin_up();
        let (b, _db) = spin_up();
        let a_addr = PeerAddress::new("127.0.0.1", a.local_addr().port());
        let b_addr = PeerAddress::new("127.0.0.1", b.local_addr().port());

        send_connect(b.registry(), &a_addr).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(200));
        send_disconnect(b.registry(), &a_addr).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(200));

        assert!(!b.registry().contains(&a_addr));
        assert!(!a.registry().contains(&b_addr));

        a.shutdown();
        b.shutdown();
    }

    #[test]
    fn self_contact_is_rejected() {
        let (a, _da) = spin_up();
        let me = a.registry().me().clone();
        assert!(matches!(
            send_connect(a.registry(), &me),
            Err(MembershipError::SelfContact(_))
        ));
        a.shutdown();
    }

    #[test]
    fn join_unreachable_seed_leaves_registry_unchanged() {
        let (a, _da) = spin_up();
        let before = a.registry().snapshot();
        // nothing listens on this port
        join_network(a.registry(), PeerAddress::new("127.0.0.1", 1));
        assert_eq!(a.registry().snapshot(), before);
        a.shutdown();
    }

    #[test]
    fn five_node_gossip_walk_converges() {
        let (a, _da) = spin_up();
        let (b, _db) = spin_up();
        let (c, _dc) = spin_up();
        let (d, _dd) = spin_up();

        let addr = |n: &Node| PeerAddress::new("127.0.0.1", n.local_addr().port());
        let (a_addr, b_addr, c_addr, d_addr) = (addr(&a), addr(&b), addr(&c), addr(&d));
        let wait = || std::thread::sleep(std::time::Duration::from_millis(300));

        send_connect(b.registry(), &a_addr).unwrap();
        wait();
        assert_eq!(
            a.registry().snapshot().into_iter().collect::<HashSet<_>>(),
            HashSet::from([b_addr.clone()])
        );
        assert_eq!(
            b.registry().snapshot().into_iter().collect::<HashSet<_>>(),
            HashSet::from([a_addr.clone()])
        );

        join_network(c.registry(), b_addr.clone());
        wait();
        assert_eq!(
            a.registry().snapshot().into_iter().collect::<HashSet<_>>(),
            HashSet::from([b_addr.clone(), c_addr.clone()])
        );
        assert_eq!(
            b.registry().snapshot().into_iter().collect::<HashSet<_>>(),
            HashSet::from([a_addr.clone(), c_addr.clone()])
        );
        assert_eq!(
            c.registry().snapshot().into_iter().collect::<HashSet<_>>(),
            HashSet::from([a_addr.clone(), b_addr.clone()])
        );

        send_disconnect(b.registry(), &a_addr).unwrap();
        wait();
        assert_eq!(
            a.registry().snapshot().into_iter().collect::<HashSet<_>>(),
            HashSet::from([c_addr.clone()])
        );
        assert_eq!(
            b.registry().snapshot().into_iter().collect::<HashSet<_>>(),
            HashSet::from([c_addr.clone()])
        );

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
}
