//! Content-addressed chunk store: one file per chunk, named by the
//! lowercase hex SHA-256 digest of its bytes.

use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ChunkStoreError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Renders a SHA-256 digest as 64 lowercase hex characters.
pub fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub struct ChunkStore {
    data_dir: PathBuf,
}

impl ChunkStore {
    /// Creates `data_dir` (recursively) if absent.
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, ChunkStoreError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        Ok(ChunkStore { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn chunk_path(&self, digest: &str) -> PathBuf {
        self.data_dir.join(digest)
    }

    /// Writes `bytes` to a sibling temp file then renames it into place.
    /// Rename is atomic on the target filesystem: readers never observe a
    /// partially-written chunk. Returns the digest.
    pub fn put(&self, bytes: &[u8]) -> Result<String, ChunkStoreError> {
        let digest = hex_digest(bytes);
        let tmp_path = self.temp_path(&digest);
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(bytes)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, self.chunk_path(&digest))?;
        Ok(digest)
    }

    /// Streams `reader` into the store while hashing it, without buffering
    /// the whole chunk in memory. Used by the transport layer for
    /// DATA_ADD. Returns the digest the data actually hashed to — the
    /// caller is responsible for checking it matches any expected digest.
    pub fn put_streamed<R: Read>(
        &self,
        reader: &mut R,
        size: usize,
    ) -> Result<String, ChunkStoreError> {
        let tmp_path = self.temp_path("incoming");
        let mut hasher = Sha256::new();
        {
            let mut tmp = File::create(&tmp_path)?;
            let mut buf = [0u8; 4096];
            let mut remaining = size;
            while remaining > 0 {
                let want = remaining.min(buf.len());
                let n = reader.read(&mut buf[..want])?;
                if n == 0 {
                    // short read: discard the temp file, surface as io error
                    let _ = fs::remove_file(&tmp_path);
                    return Err(ChunkStoreError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed before declared payload was fully read",
                    )));
                }
                hasher.update(&buf[..n]);
                tmp.write_all(&buf[..n])?;
                remaining -= n;
            }
            tmp.sync_all()?;
        }
        let digest = hex::encode(hasher.finalize());
        fs::rename(&tmp_path, self.chunk_path(&digest))?;
        Ok(digest)
    }

    pub fn get(&self, digest: &str) -> Result<Option<Vec<u8>>, ChunkStoreError> {
        match fs::read(self.chunk_path(digest)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Opens a chunk for streaming reads without loading it whole into
    /// memory. Used by the transport layer for DATA_GET responses.
    pub fn open(&self, digest: &str) -> Result<Option<File>, ChunkStoreError> {
        match File::open(self.chunk_path(digest)) {
            Ok(f) => Ok(Some(f)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn size(&self, digest: &str) -> Result<Option<u64>, ChunkStoreError> {
        match fs::metadata(self.chunk_path(digest)) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn contains(&self, digest: &str) -> bool {
        self.chunk_path(digest).exists()
    }

    /// Absence is not an error.
    pub fn remove(&self, digest: &str) -> Result<(), ChunkStoreError> {
        match fs::remove_file(self.chunk_path(digest)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn temp_path(&self, hint: &str) -> PathBuf {
        let unique = format!(
            ".{hint}.{}.{}.tmp",
            std::process::id(),
            rand_suffix()
        );
        self.data_dir.join(unique)
    }
}

fn rand_suffix() -> u64 {
    use rand::Rng;
    rand::thread_rng().gen::<u64>()
}
