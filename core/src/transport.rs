//! Chunk transport: streaming DATA_ADD / DATA_GET / DATA_REMOVE.
//!
//! All three operations move payloads through a fixed 4 KiB buffer so
//! arbitrarily large chunks never have to be loaded whole into memory on
//! either side.

use crate::chunkstore::{ChunkStore, ChunkStoreError};
use crate::net::{connect, DEFAULT_TIMEOUT};
use crate::registry::PeerAddress;
use crate::wire::{self, WireError};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

const BUF_SIZE: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
    #[error("chunk store error: {0}")]
    Store(#[from] ChunkStoreError),
}

/// Where a DATA_ADD payload is read from: a file on disk, or a buffer
/// already in memory.
pub enum DataSource<'a> {
    Path(&'a Path),
    Bytes(&'a [u8]),
}

impl DataSource<'_> {
    fn len(&self) -> Result<usize, TransportError> {
        Ok(match self {
            DataSource::Path(p) => fs::metadata(p)?.len() as usize,
            DataSource::Bytes(b) => b.len(),
        })
    }
}

/// Sends `source`'s bytes to `peer` as a DATA_ADD request. No response is
/// expected; the connection is closed by the peer once it has accepted
/// the declared number of bytes.
pub fn send_data_add(peer: &PeerAddress, source: DataSource) -> Result<(), TransportError> {
    let size = source.len()?;
    let mut stream = connect(peer, DEFAULT_TIMEOUT)?;
    wire::write_data_add_header(&mut stream, size)?;

    match source {
        DataSource::Bytes(bytes) => stream.write_all(bytes)?,
        DataSource::Path(path) => {
            let mut file = File::open(path)?;
            let mut buf = [0u8; BUF_SIZE];
            loop {
                let n = file.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                stream.write_all(&buf[..n])?;
            }
        }
    }
    Ok(())
}

/// Requests `digest` from `peer`, writing the result to `out_path`
/// (via a sibling temp file, renamed into place) if found. Returns
/// `Ok(None)` on NOT_FOUND (size-0 response) rather than an error.
pub fn send_data_get(
    peer: &PeerAddress,
    digest: &str,
    out_path: &Path,
) -> Result<Option<PathBuf>, TransportError> {
    let mut stream = connect(peer, DEFAULT_TIMEOUT)?;
    stream.write_all(&wire::encode_data_get(digest))?;

    let size = wire::read_data_get_response_header(&mut stream)?;
    if size == 0 {
        return Ok(None);
    }

    let tmp_path = out_path.with_extension("part-tmp");
    {
        let mut tmp = File::create(&tmp_path)?;
        let mut remaining = size;
        let mut buf = [0u8; BUF_SIZE];
        while remaining > 0 {
            let want = remaining.min(buf.len());
            let n = stream.read(&mut buf[..want])?;
            if n == 0 {
                let _ = fs::remove_file(&tmp_path);
                return Err(TransportError::Wire(WireError::ShortPayload {
                    expected: size,
                    got: size - remaining,
                }));
            }
            tmp.write_all(&buf[..n])?;
            remaining -= n;
        }
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, out_path)?;
    Ok(Some(out_path.to_path_buf()))
}

/// Fire-and-forget DATA_REMOVE.
pub fn send_data_remove(peer: &PeerAddress, digest: &str) -> Result<(), TransportError> {
    let mut stream = connect(peer, DEFAULT_TIMEOUT)?;
    stream.write_all(&wire::encode_data_remove(digest))?;
    Ok(())
}

/// Server-side DATA_ADD handler: streams exactly `size` bytes from the
/// connection into the store, computing the digest as it goes. The
/// received digest need not match any caller-declared one — DATA_ADD's
/// header carries only a size, never an expected digest.
pub fn handle_data_add(
    store: &ChunkStore,
    stream: &mut TcpStream,
    size: usize,
) -> Result<String, TransportError> {
    stream.set_read_timeout(Some(Duration::from_secs(60)))?;
    Ok(store.put_streamed(stream, size)?)
}

/// Server-side DATA_GET handler: writes the size header then streams the
/// chunk, or writes a zero-size header if the digest is unknown.
pub fn handle_data_get(
    store: &ChunkStore,
    stream: &mut TcpStream,
    digest: &str,
) -> Result<(), TransportError> {
    match store.size(digest)? {
        None => {
            wire::write_data_get_response_header(stream, 0)?;
        }
        Some(len) => {
            wire::write_data_get_response_header(stream, len as usize)?;
            let mut file = store.open(digest)?.ok_or(ChunkStoreError::Io(
                io::Error::new(io::ErrorKind::NotFound, "chunk vanished mid-read"),
            ))?;
            let mut chunk = [0u8; BUF_SIZE];
            loop {
                let n = file.read(&mut chunk)?;
                if n == 0 {
                    break;
                }
                stream.write_all(&chunk[..n])?;
            }
        }
    }
    Ok(())
}

/// Server-side DATA_REMOVE handler: absence is not an error.
pub fn handle_data_remove(store: &ChunkStore, digest: &str) -> Result<(), TransportError> {
    Ok(store.remove(digest)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use crate::registry::PeerAddress;

    fn spin_up(dir: &std::path::Path) -> Node {
        Node::bind("127.0.0.1", 0, dir).unwrap()
    }

    #[test]
    fn data_add_get_remove_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let node = spin_up(dir.path());
        let peer = PeerAddress::new("127.0.0.1", node.local_addr().port());

        send_data_add(&peer, DataSource::Bytes(b"Hello, World!")).unwrap();
        std::thread::sleep(Duration::from_millis(200));

        let digest = crate::chunkstore::hex_digest(b"Hello, World!");
        assert!(node.chunk_store().contains(&digest));

        let out_dir = tempfile::tempdir().unwrap();
        let out_path = out_dir.path().join("out.bin");
        let got = send_data_get(&peer, &digest, &out_path).unwrap();
        assert!(got.is_some());
        assert_eq!(fs::read(&out_path).unwrap(), b"Hello, World!");

        send_data_remove(&peer, &digest).unwrap();
        std::thread::sleep(Duration::from_millis(200));
        assert!(!node.chunk_store().contains(&digest));

        node.shutdown();
    }

    #[test]
    fn data_get_unknown_digest_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let node = spin_up(dir.path());
        let peer = PeerAddress::new("127.0.0.1", node.local_addr().port());
        let out_dir = tempfile::tempdir().unwrap();
        let out_path = out_dir.path().join("out.bin");
        let got = send_data_get(&peer, "fdjgfnjds", &out_path).unwrap();
        assert!(got.is_none());
        assert!(!out_path.exists());
        node.shutdown();
    }
}
