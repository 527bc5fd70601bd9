/// Output archive writer
///
/// Bundles a staged image directory into a single tar file in the layout
/// `docker load` expects. Entries are appended in the caller's order with
/// plain relative names (no leading `./`).
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::fetch::pull_error::{PullError, Result};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const LAYER_FILE: &str = "layer.tar";

/// One element of the top-level `manifest.json` array
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ArchiveManifestEntry {
    pub config: String,
    pub repo_tags: Vec<String>,
    pub layers: Vec<String>,
}

/// Serialise the single-entry `manifest.json` array
pub fn manifest_json(entry: &ArchiveManifestEntry) -> Result<Vec<u8>> {
    serde_json::to_vec(&[entry]).map_err(|e| PullError::json("archive manifest", e))
}

/// Tar `entries` (paths relative to `staging`) into `output`.
///
/// The archive is written next to `output` under a temporary name and
/// renamed when complete, so a failure never leaves a partial archive.
pub fn write_archive(staging: &Path, entries: &[String], output: &Path) -> Result<()> {
    let parent = match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let temp = NamedTempFile::new_in(parent).map_err(|e| PullError::fs(parent, e))?;
    {
        let mut builder = tar::Builder::new(temp.as_file());
        for name in entries {
            let source = staging.join(name);
            let appended = if source.is_dir() {
                builder.append_dir(name, &source)
            } else {
                builder.append_path_with_name(&source, name)
            };
            appended.map_err(|e| PullError::fs(&source, e))?;
        }
        builder.finish().map_err(|e| PullError::fs(temp.path(), e))?;
    }
    temp.as_file()
        .sync_all()
        .map_err(|e| PullError::fs(temp.path(), e))?;
    temp.persist(output)
        .map_err(|e| PullError::fs(output, e.error))?;

    tracing::debug!(path = %output.display(), entries = entries.len(), "Wrote image archive");
    Ok(())
}
