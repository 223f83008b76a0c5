//! Durable tier stored as one JSON file per key.

use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::debug;

use crate::cache::entry::current_timestamp_ms;
use crate::cache::CacheBackend;
use crate::error::{EngineError, Result};

#[derive(Serialize, Deserialize)]
struct Record {
    expires_at_ms: u64,
    value: String,
}

/// Writes each entry to `<dir>/<encoded key>.json`; files survive restarts.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Opens (creating if needed) the backing directory.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await.map_err(|e| io_unavailable(&dir, e))?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(key)))
    }
}

/// Longest encoded key used verbatim as a file stem.
const MAX_ENCODED_LEN: usize = 200;

/// Maps a key to a filesystem safe name. Alphanumerics, `-` and `_` pass
/// through; every other byte becomes `%XX`, so distinct keys never collide.
///
/// Encodings longer than [`MAX_ENCODED_LEN`] become `~<sha256 hex>`; `~` never
/// appears in a plain encoding, so the two forms cannot collide either.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    if out.len() > MAX_ENCODED_LEN {
        return format!("~{}", hex::encode(Sha256::digest(key.as_bytes())));
    }
    out
}

/// Writes `body` to a uniquely named temp file in `dir`, then renames it
/// over `path`. Concurrent writers of one key never share a temp file.
fn write_atomic(dir: &Path, path: &Path, body: &[u8]) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| io_unavailable(dir, e))?;
    tmp.write_all(body).map_err(|e| io_unavailable(dir, e))?;
    tmp.persist(path).map_err(|e| io_unavailable(path, e.error))?;
    Ok(())
}

fn io_unavailable(path: &Path, err: std::io::Error) -> EngineError {
    EngineError::CacheTierUnavailable(format!("durable {}: {}", path.display(), err))
}

#[async_trait]
impl CacheBackend for FileBackend {
    fn name(&self) -> &str {
        "durable_file"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_unavailable(&path, e)),
        };

        let record: Record = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                debug!("Discarding unreadable durable record {}: {}", path.display(), e);
                self.delete(key).await?;
                return Ok(None);
            }
        };

        if current_timestamp_ms() >= record.expires_at_ms {
            self.delete(key).await?;
            return Ok(None);
        }
        Ok(Some(record.value))
    }

    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> Result<()> {
        let path = self.path_for(key);
        let record = Record {
            expires_at_ms: current_timestamp_ms().saturating_add(ttl_secs.saturating_mul(1000)),
            value,
        };
        let body = serde_json::to_vec(&record)?;

        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || write_atomic(&dir, &path, &body))
            .await
            .map_err(|e| EngineError::CacheTierUnavailable(format!("durable write task: {}", e)))?
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_unavailable(&path, e)),
        }
    }
}
