/// Image manifest types and parsing
///
/// Supports schema 2 image manifests:
/// - Docker Manifest V2 (application/vnd.docker.distribution.manifest.v2+json)
/// - OCI Image Manifest (application/vnd.oci.image.manifest.v1+json), same shape
use serde::Deserialize;

use crate::fetch::pull_error::{PullError, Result};

/// Media types for OCI/Docker manifests
pub mod media_types {
    pub const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
    pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
    pub const DOCKER_MANIFEST_LIST: &str =
        "application/vnd.docker.distribution.manifest.list.v2+json";
}

/// Content descriptor
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    #[serde(default)]
    pub media_type: Option<String>,

    /// Content digest (e.g., "sha256:abc123...")
    pub digest: String,

    #[serde(default)]
    pub size: Option<u64>,
}

impl Descriptor {
    /// Hex part of the digest, the text after `algorithm:`
    pub fn digest_hex(&self) -> &str {
        digest_hex(&self.digest)
    }

    /// Check the digest is `<algorithm>:<hex>`.
    ///
    /// The hex part names files and directories in the staging area, so
    /// anything that could act as a path component is refused.
    pub fn validate(&self) -> Result<()> {
        validate_digest(&self.digest)
    }
}

/// Schema 2 image manifest. Layer order is application order.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub schema_version: u32,

    #[serde(default)]
    pub media_type: Option<String>,

    pub config: Descriptor,

    pub layers: Vec<Descriptor>,
}

/// Only used to recognise manifest lists, which are not pulled
#[derive(Deserialize)]
struct IndexProbe {
    #[serde(default)]
    manifests: Option<Vec<serde_json::Value>>,
}

impl Manifest {
    /// Parse manifest from JSON bytes
    pub fn parse(data: &[u8]) -> Result<Self> {
        if let Ok(IndexProbe {
            manifests: Some(_),
        }) = serde_json::from_slice::<IndexProbe>(data)
        {
            return Err(PullError::Protocol(
                "Registry returned a manifest list; multi-platform images are not supported"
                    .to_string(),
            ));
        }

        let manifest: Manifest =
            serde_json::from_slice(data).map_err(|e| PullError::json("image manifest", e))?;

        if manifest.schema_version != 2 {
            return Err(PullError::Protocol(format!(
                "Unsupported manifest schema version {}",
                manifest.schema_version
            )));
        }

        if let Some(media_type) = manifest.media_type.as_deref() {
            if media_type == media_types::OCI_INDEX || media_type == media_types::DOCKER_MANIFEST_LIST
            {
                return Err(PullError::Protocol(format!(
                    "Unsupported manifest media type {}",
                    media_type
                )));
            }
        }

        manifest.config.validate()?;
        for layer in &manifest.layers {
            layer.validate()?;
        }

        Ok(manifest)
    }
}

/// Validate a digest of the form `<algorithm>:<hex>`, where the algorithm
/// is lower-case alphanumeric and the encoded part is hexadecimal.
pub fn validate_digest(digest: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(PullError::Protocol(format!(
            "Invalid digest '{}' in manifest: {}",
            digest, reason
        )))
    };

    let Some((algorithm, hex)) = digest.split_once(':') else {
        return invalid("missing algorithm prefix");
    };

    if algorithm.is_empty() {
        return invalid("empty algorithm");
    }
    if !algorithm
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return invalid("algorithm must be lower-case alphanumeric");
    }
    if hex.is_empty() {
        return invalid("empty hex");
    }
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return invalid("encoded part must be hexadecimal");
    }

    Ok(())
}

/// Text after the first `:` of a digest, or the whole digest if it has none
pub fn digest_hex(digest: &str) -> &str {
    digest
        .split_once(':')
        .map(|(_, hex)| hex)
        .unwrap_or(digest)
}
