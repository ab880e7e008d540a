//! File layer: split/upload, manifest persistence, download/reassemble,
//! remove.

use crate::chunkstore::hex_digest;
use crate::cipher::{Cipher, CipherError};
use crate::envpath::expand_env_vars;
use crate::node::Node;
use crate::registry::PeerAddress;
use crate::transport::{self, DataSource, TransportError};
use log::{info, warn};
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Default part size for production uploads; tests use much smaller sizes
/// to keep fixtures cheap.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024 * 1024;
/// Default replication factor.
pub const DEFAULT_REPLICATION: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct FileLayerConfig {
    pub chunk_size: usize,
    pub replication: usize,
}

impl Default for FileLayerConfig {
    fn default() -> Self {
        FileLayerConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            replication: DEFAULT_REPLICATION,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("manifest error: {0}")]
    Manifest(#[from] crate::manifest::ManifestError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("cipher error: {0}")]
    Cipher(#[from] CipherError),
    #[error("no manifest entry for file {0:?}")]
    UnknownFile(String),
    #[error("encryption key for {0:?} is missing")]
    MissingKey(String),
    #[error("path has no filename component: {0:?}")]
    NoBasename(PathBuf),
    #[error("unable to find all parts for {0:?}; download aborted")]
    PartialDownload(String),
}

fn basename_of(path: &Path) -> Result<String, FileError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| FileError::NoBasename(path.to_path_buf()))
}

fn choose_peers(node: &Node, r: usize) -> Vec<PeerAddress> {
    let mut snapshot = node.registry().snapshot();
    let mut rng = rand::thread_rng();
    snapshot.shuffle(&mut rng);
    snapshot.truncate(r);
    snapshot
}

fn key_path(data_dir: &Path, basename: &str) -> PathBuf {
    data_dir.join(format!("{basename}.key"))
}

/// Uploads the file at `path` (after `$VAR` expansion), splitting it into
/// `cfg.chunk_size`-byte parts and replicating each across `cfg.replication`
/// randomly chosen peers.
pub fn upload_file(
    node: &Node,
    path: &Path,
    cfg: &FileLayerConfig,
    cipher: Option<&dyn Cipher>,
) -> Result<(), FileError> {
    let expanded = expand_env_vars(&path.to_string_lossy());
    let expanded_path = PathBuf::from(expanded);
    let basename = basename_of(&expanded_path)?;
    let mut file = File::open(&expanded_path)?;

    let key = if let Some(cipher) = cipher {
        let key = cipher.generate_key();
        fs::write(key_path(node.data_dir(), &basename), &key)?;
        Some(key)
    } else {
        None
    };

    let mut parts = Vec::new();
    let mut buf = vec![0u8; cfg.chunk_size];
    loop {
        let n = read_up_to(&mut file, &mut buf)?;
        if n == 0 {
            break;
        }
        let chunk = &buf[..n];
        let to_send: Vec<u8> = match (&cipher, &key) {
            (Some(c), Some(k)) => c.encrypt(k, chunk)?,
            _ => chunk.to_vec(),
        };
        replicate_part(node, cfg.replication, &to_send);
        parts.push(hex_digest(&to_send));
    }

    node.manifest().put(&basename, parts)?;
    info!("uploaded {basename}");
    Ok(())
}

/// Uploads an in-memory buffer under `basename` instead of a filesystem
/// path (the prototype's `sendDataAdd(..., bytedata=...)` overload).
pub fn upload_bytes(
    node: &Node,
    basename: &str,
    bytes: &[u8],
    cfg: &FileLayerConfig,
    cipher: Option<&dyn Cipher>,
) -> Result<(), FileError> {
    let key = if let Some(cipher) = cipher {
        let key = cipher.generate_key();
        fs::write(key_path(node.data_dir(), basename), &key)?;
        Some(key)
    } else {
        None
    };

    let mut parts = Vec::new();
    for chunk in bytes.chunks(cfg.chunk_size.max(1)) {
        let to_send: Vec<u8> = match (&cipher, &key) {
            (Some(c), Some(k)) => c.encrypt(k, chunk)?,
            _ => chunk.to_vec(),
        };
        replicate_part(node, cfg.replication, &to_send);
        parts.push(hex_digest(&to_send));
    }

    node.manifest().put(basename, parts)?;
    info!("uploaded {basename} ({} bytes)", bytes.len());
    Ok(())
}

fn replicate_part(node: &Node, replication: usize, bytes: &[u8]) {
    for peer in choose_peers(node, replication) {
        if let Err(e) = transport::send_data_add(&peer, DataSource::Bytes(bytes)) {
            warn!("replicate to {peer} failed: {e}");
        }
    }
}

/// Reads up to `buf.len()` bytes, looping over short reads, stopping at
/// EOF. Unlike `Read::read_exact` this does not error on a final partial
/// buffer — that's the normal last-chunk case.
fn read_up_to<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = r.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Downloads `basename` by gathering its parts from whichever known peers
/// still hold them, then reassembling them in order into `out_path`. If
/// any part can't be found on any peer, the download fails and `out_path`
/// is never created — a partial file would be indistinguishable from a
/// complete one to a caller that didn't check the return value.
pub fn download_file(
    node: &Node,
    basename: &str,
    out_path: &Path,
    cipher: Option<&dyn Cipher>,
) -> Result<(), FileError> {
    let out_path = PathBuf::from(expand_env_vars(&out_path.to_string_lossy()));
    let out_path = out_path.as_path();
    let parts = node
        .manifest()
        .get(basename)
        .ok_or_else(|| FileError::UnknownFile(basename.to_string()))?;

    let key = if cipher.is_some() {
        Some(
            fs::read(key_path(node.data_dir(), basename))
                .map_err(|_| FileError::MissingKey(basename.to_string()))?,
        )
    } else {
        None
    };

    let unique: HashSet<&String> = parts.iter().collect();
    let mut found: HashMap<String, PathBuf> = HashMap::new();
    let temp_dir = tempfile::Builder::new()
        .prefix("shardnet-download-")
        .tempdir()?;

    'peers: for peer in node.registry().snapshot() {
        if found.len() >= unique.len() {
            break 'peers;
        }
        for digest in unique.iter() {
            if found.contains_key(digest.as_str()) {
                continue;
            }
            let out = temp_dir.path().join(digest.as_str());
            match transport::send_data_get(&peer, digest, &out) {
                Ok(Some(path)) => {
                    found.insert((*digest).clone(), path);
                }
                Ok(None) => {}
                Err(e) => warn!("DATA_GET of {digest} from {peer} failed: {e}"),
            }
        }
    }

    if found.len() < unique.len() {
        warn!("unable to find all file parts for {basename}");
        return Err(FileError::PartialDownload(basename.to_string()));
    }

    let mut out = File::create(out_path)?;
    for digest in &parts {
        let part_path = &found[digest];
        let bytes = fs::read(part_path)?;
        let plain = match (&cipher, &key) {
            (Some(c), Some(k)) => c.decrypt(k, &bytes)?,
            _ => bytes,
        };
        out.write_all(&plain)?;
    }

    info!("downloaded {basename}");
    Ok(())
}

/// Broadcasts DATA_REMOVE for every part digest to every known peer (the
/// uploader doesn't track which peers actually hold a given part), then
/// drops the manifest entry.
pub fn remove_file(node: &Node, basename: &str) -> Result<(), FileError> {
    let Some(parts) = node.manifest().get(basename) else {
        info!("removeFile: no manifest entry for {basename}, nothing to do");
        return Ok(());
    };

    let peers = node.registry().snapshot();
    for digest in &parts {
        for peer in &peers {
            if let Err(e) = transport::send_data_remove(peer, digest) {
                warn!("DATA_REMOVE of {digest} to {peer} failed: {e}");
            }
        }
    }

    node.manifest().remove(basename)?;
    Ok(())
}
