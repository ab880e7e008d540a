//! Connection listener/dispatcher and node lifecycle.
//!
//! One dedicated background thread runs the accept loop; each accepted
//! connection is dispatched onto its own thread so a large DATA_GET never
//! head-of-line-blocks a concurrent PING. This is safe because the
//! registry and chunk store stay internally serialized via their own
//! lock/filesystem-atomicity guarantees.

use crate::chunkstore::ChunkStore;
use crate::envpath::expand_env_vars;
use crate::manifest::{ManifestError, ManifestTable};
use crate::membership::send_ping;
use crate::registry::{PeerAddress, PeerRegistry};
use crate::transport;
use crate::wire::{self, Request, WireError};
use log::{debug, info, warn};
use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
}

/// A running node: listener, peer registry, chunk store, manifest table,
/// and the accept loop keeping them all alive.
pub struct Node {
    local_addr: SocketAddr,
    registry: Arc<PeerRegistry>,
    chunk_store: Arc<ChunkStore>,
    manifest: Arc<ManifestTable>,
    data_dir: PathBuf,
    shutdown: Arc<AtomicBool>,
    accept_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Node {
    /// Binds a listening socket, loads persisted state from `data_dir`,
    /// and starts the accept loop. `host` is the address peers should use
    /// to reach this node; if `port` is 0 the OS assigns one, discoverable
    /// via [`Node::local_addr`].
    pub fn bind(
        host: impl Into<String>,
        port: u16,
        data_dir: impl Into<PathBuf>,
    ) -> Result<Self, NodeError> {
        let host = host.into();
        let data_dir = data_dir.into();
        let data_dir = PathBuf::from(expand_env_vars(&data_dir.to_string_lossy()));

        let listener = TcpListener::bind((host.as_str(), port))?;
        let local_addr = listener.local_addr()?;
        info!("listening on {local_addr}");

        let registry = Arc::new(PeerRegistry::new(PeerAddress::new(host, local_addr.port())));
        let chunk_store = Arc::new(ChunkStore::new(&data_dir)?);
        let manifest = Arc::new(ManifestTable::load(&data_dir)?);
        let shutdown = Arc::new(AtomicBool::new(false));

        let accept_handle = {
            let registry = registry.clone();
            let chunk_store = chunk_store.clone();
            let shutdown = shutdown.clone();
            thread::spawn(move || accept_loop(listener, registry, chunk_store, shutdown))
        };

        Ok(Node {
            local_addr,
            registry,
            chunk_store,
            manifest,
            data_dir,
            shutdown,
            accept_handle: Mutex::new(Some(accept_handle)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn registry_arc(&self) -> Arc<PeerRegistry> {
        self.registry.clone()
    }

    pub fn chunk_store(&self) -> &ChunkStore {
        &self.chunk_store
    }

    pub fn chunk_store_arc(&self) -> Arc<ChunkStore> {
        self.chunk_store.clone()
    }

    pub fn manifest(&self) -> &ManifestTable {
        &self.manifest
    }

    pub fn manifest_arc(&self) -> Arc<ManifestTable> {
        self.manifest.clone()
    }

    pub fn data_dir(&self) -> &std::path::Path {
        &self.data_dir
    }

    /// Sets the shutdown flag, then self-pings to unblock the pending
    /// `accept()`, then joins the accept thread. Idempotent: a second
    /// call is a no-op.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return; // already shut down
        }
        let self_addr = PeerAddress::new(self.local_addr.ip().to_string(), self.local_addr.port());
        if let Err(e) = send_ping(&self_addr) {
            warn!("self-ping during shutdown failed (accept loop may block briefly): {e}");
        }
        if let Some(handle) = self.accept_handle.lock().expect("poisoned").take() {
            let _ = handle.join();
        }
        info!("{} shut down", self.local_addr);
    }
}

fn accept_loop(
    listener: TcpListener,
    registry: Arc<PeerRegistry>,
    chunk_store: Arc<ChunkStore>,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer_addr)) => {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                debug!("accepted connection from {peer_addr}");
                let registry = registry.clone();
                let chunk_store = chunk_store.clone();
                thread::spawn(move || {
                    if let Err(e) = handle_connection(stream, &registry, &chunk_store) {
                        debug!("connection from {peer_addr} closed with error: {e}");
                    }
                });
            }
            Err(e) => {
                warn!("accept() failed: {e}");
                break;
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum HandlerError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Transport(#[from] transport::TransportError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

fn handle_connection(
    mut stream: TcpStream,
    registry: &PeerRegistry,
    chunk_store: &ChunkStore,
) -> Result<(), HandlerError> {
    let request = wire::read_request(&mut stream)?;
    match request {
        Request::Ping => {
            debug!("received ping");
        }
        Request::Connect { host, port } => {
            let p = PeerAddress::new(host, port);
            registry.add(p.clone());
            debug!("registry += {p}");
        }
        Request::Disconnect { host, port } => {
            let p = PeerAddress::new(host, port);
            registry.remove(&p);
            debug!("registry -= {p}");
        }
        Request::GetPeers => {
            let peers: Vec<(String, u16)> = registry
                .snapshot()
                .into_iter()
                .map(|p| (p.host, p.port))
                .collect();
            stream.write_all(&wire::encode_peer_listing(&peers))?;
        }
        Request::DataAdd { size } => {
            transport::handle_data_add(chunk_store, &mut stream, size)?;
        }
        Request::DataGet { digest } => {
            transport::handle_data_get(chunk_store, &mut stream, &digest)?;
        }
        Request::DataRemove { digest } => {
            transport::handle_data_remove(chunk_store, &digest)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_and_shuts_down_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let node = Node::bind("127.0.0.1", 0, dir.path()).unwrap();
        assert!(node.local_addr().port() > 0);
        node.shutdown();
        node.shutdown(); // no-op, must not hang or panic
    }

    #[test]
    fn data_dir_is_env_expanded() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("SHARDNET_NODE_DATA_DIR", dir.path().to_str().unwrap());
        let node = Node::bind("127.0.0.1", 0, "$SHARDNET_NODE_DATA_DIR/sub").unwrap();
        std::env::remove_var("SHARDNET_NODE_DATA_DIR");
        assert_eq!(node.data_dir(), dir.path().join("sub"));
        node.shutdown();
    }

    #[test]
    fn ping_is_accepted_and_connection_closes() {
        let dir = tempfile::tempdir().unwrap();
        let node = Node::bind("127.0.0.1", 0, dir.path()).unwrap();
        let peer = PeerAddress::new("127.0.0.1", node.local_addr().port());
        send_ping(&peer).unwrap();
        node.shutdown();
    }
}
