//! Peer registry: the set of currently-known peer addresses.

use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;

/// A `(host, port)` pair uniquely identifying a node's listening socket.
/// Equality is structural: two addresses are equal iff both fields match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddress {
    pub host: String,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        PeerAddress {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Thread-safe, self-excluding set of known peers. Every operation holds
/// an exclusive lock over the whole set so the registry is never observed
/// mid-mutation.
pub struct PeerRegistry {
    me: PeerAddress,
    peers: Mutex<HashSet<PeerAddress>>,
}

impl PeerRegistry {
    pub fn new(me: PeerAddress) -> Self {
        PeerRegistry {
            me,
            peers: Mutex::new(HashSet::new()),
        }
    }

    pub fn me(&self) -> &PeerAddress {
        &self.me
    }

    /// Inserts `p` unless it is this node's own address. Returns whether
    /// the set actually changed.
    pub fn add(&self, p: PeerAddress) -> bool {
        if p == self.me {
            return false;
        }
        self.peers.lock().expect("peer registry poisoned").insert(p)
    }

    /// No-op if `p` is absent.
    pub fn remove(&self, p: &PeerAddress) -> bool {
        self.peers.lock().expect("peer registry poisoned").remove(p)
    }

    pub fn contains(&self, p: &PeerAddress) -> bool {
        self.peers.lock().expect("peer registry poisoned").contains(p)
    }

    /// A detached copy so callers can iterate without holding the lock.
    pub fn snapshot(&self) -> Vec<PeerAddress> {
        self.peers
            .lock()
            .expect("peer registry poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.lock().expect("peer registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
