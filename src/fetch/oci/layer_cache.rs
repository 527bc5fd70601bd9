//! Content-addressed cache for downloaded blobs.
//!
//! Each blob is stored as a flat file under the cache root, named after its
//! digest, so a blob shared by several images (or pulled again later) only
//! crosses the network once. Presence of the file is authoritative: entries
//! are only ever created by renaming a complete, verified download into
//! place, and are never modified or removed here.
//!
//! Two processes fetching the same digest into the same root at the same
//! time both download it; the last rename wins. Nothing is locked.

use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::fetch::http::BlobSink;
use crate::fetch::pull_error::{PullError, Result};

/// A blob available on local disk
#[derive(Debug, Clone)]
pub struct CachedBlob {
    pub path: PathBuf,
    /// `true` when the entry already existed and nothing was fetched
    pub from_cache: bool,
}

/// Content-addressed blob cache rooted at a directory
pub struct LayerCache {
    root: PathBuf,
    verify_digests: bool,
}

impl LayerCache {
    /// Open (creating if needed) a cache at `root`.
    pub fn new(root: &Path, verify_digests: bool) -> Result<Self> {
        std::fs::create_dir_all(root).map_err(|e| PullError::fs(root, e))?;

        Ok(Self {
            root: root.to_path_buf(),
            verify_digests,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path the entry for `digest` lives at, whether or not it exists
    pub fn entry_path(&self, digest: &str) -> PathBuf {
        self.root.join(cache_file_name(digest))
    }

    /// Return the cached file for `digest`, calling `fetch` only when no
    /// entry exists yet.
    ///
    /// `fetch` receives a writer backed by a temporary file in the cache
    /// root and hands it back once the body has been written. The entry
    /// only appears after the content checks out.
    pub async fn ensure_cached<F, Fut>(&self, digest: &str, fetch: F) -> Result<CachedBlob>
    where
        F: FnOnce(BlobWriter) -> Fut,
        Fut: Future<Output = Result<BlobWriter>>,
    {
        let path = self.entry_path(digest);

        if path.is_file() {
            tracing::debug!(digest, path = %path.display(), "Blob cache hit");
            return Ok(CachedBlob {
                path,
                from_cache: true,
            });
        }

        tracing::debug!(digest, "Blob cache miss, fetching");
        let writer = fetch(self.writer()?).await?;
        let size = writer.size;

        self.commit(digest, &path, writer)?;

        tracing::debug!(
            digest,
            size_bytes = size,
            path = %path.display(),
            "Cached blob"
        );

        Ok(CachedBlob {
            path,
            from_cache: false,
        })
    }

    fn writer(&self) -> Result<BlobWriter> {
        let file = NamedTempFile::new_in(&self.root).map_err(|e| PullError::fs(&self.root, e))?;
        Ok(BlobWriter {
            file,
            hasher: Sha256::new(),
            size: 0,
        })
    }

    /// Verify, sync and rename the temporary file into place. On error the
    /// temporary file is dropped and removed.
    fn commit(&self, digest: &str, path: &Path, writer: BlobWriter) -> Result<()> {
        let BlobWriter { file, hasher, .. } = writer;

        if self.verify_digests {
            compare_digest(digest, &hex::encode(hasher.finalize()))?;
        }

        file.as_file()
            .sync_all()
            .map_err(|e| PullError::fs(file.path(), e))?;
        file.persist(path)
            .map_err(|e| PullError::fs(path, e.error))?;
        Ok(())
    }
}

/// Temporary cache file that hashes everything written to it
pub struct BlobWriter {
    file: NamedTempFile,
    hasher: Sha256,
    size: u64,
}

impl BlobWriter {
    /// Bytes written so far
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl BlobSink for BlobWriter {
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.file
            .write_all(chunk)
            .map_err(|e| PullError::fs(self.file.path(), e))?;
        self.hasher.update(chunk);
        self.size += chunk.len() as u64;
        Ok(())
    }
}

/// File name for a digest with path-hostile characters replaced
pub fn cache_file_name(digest: &str) -> String {
    digest.replace([':', '/', '\\'], "_")
}

/// Check that `data` hashes to `digest`.
///
/// Only `sha256:` digests are checked; other algorithms are accepted as-is.
pub fn verify_digest(digest: &str, data: &[u8]) -> Result<()> {
    compare_digest(digest, &hex::encode(Sha256::digest(data)))
}

/// Compare `digest` with the hex sha256 of the content it names
fn compare_digest(digest: &str, actual: &str) -> Result<()> {
    match digest.split_once(':') {
        Some(("sha256", expected)) => {
            if actual.eq_ignore_ascii_case(expected) {
                Ok(())
            } else {
                Err(PullError::DigestMismatch {
                    expected: digest.to_string(),
                    actual: format!("sha256:{}", actual),
                })
            }
        }
        _ => {
            tracing::warn!(digest, "Unsupported digest algorithm, skipping integrity check");
            Ok(())
        }
    }
}
