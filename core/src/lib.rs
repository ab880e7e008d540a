//! `shardnet-core`: the peer-to-peer content-addressed file store engine.
//!
//! This crate is the whole of the node: peer membership gossip, the
//! framed wire protocol, the content-addressed chunk store, the
//! streaming chunk transport, and the file-sharding/reassembly layer
//! built on top of them. It carries no CLI and no logging backend
//! configuration of its own — those belong to the caller (see the
//! `shardnet` binary crate at the workspace root), this crate only
//! emits `log` records.

pub mod chunkstore;
pub mod cipher;
pub mod envpath;
pub mod file;
pub mod manifest;
pub mod membership;
pub mod net;
pub mod node;
pub mod registry;
pub mod transport;
pub mod wire;

pub use chunkstore::{ChunkStore, ChunkStoreError};
pub use cipher::{AesGcmCipher, Cipher, CipherError};
pub use file::{FileError, FileLayerConfig};
pub use manifest::{ManifestError, ManifestTable};
pub use membership::MembershipError;
pub use node::{Node, NodeError};
pub use registry::{PeerAddress, PeerRegistry};
pub use transport::TransportError;
pub use wire::WireError;

/// Aggregates every module's error type behind one `?`-friendly type for
/// callers that don't care which layer failed (e.g. the CLI binary).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error(transparent)]
    Membership(#[from] MembershipError),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    ChunkStore(#[from] ChunkStoreError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    File(#[from] FileError),
    #[error(transparent)]
    Cipher(#[from] CipherError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
