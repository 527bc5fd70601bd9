/// Pull an image into a loadable archive
///
/// Pipeline:
/// reference -> manifest -> config blob -> layers (through the blob cache)
///           -> staging directory -> manifest.json -> tar archive
use std::collections::HashSet;
use std::path::Path;

use tempfile::TempDir;

use super::archive::{manifest_json, write_archive, ArchiveManifestEntry, LAYER_FILE, MANIFEST_FILE};
use super::auth::Credentials;
use super::layer_cache::{verify_digest, LayerCache};
use super::manifest::Manifest;
use super::reference::ImageReference;
use super::registry::RegistryTransport;
use crate::fetch::http::{HttpTransport, ReqwestTransport};
use crate::fetch::options::{HttpClientOptions, PullOptions};
use crate::fetch::pull_error::{PullError, Result};

/// What a pull produced
#[derive(Debug, Clone)]
pub struct PullSummary {
    pub reference: ImageReference,
    /// Config file name inside the archive, `<hex>.json`
    pub config: String,
    /// Layer paths inside the archive, in application order
    pub layers: Vec<String>,
    pub layers_from_cache: usize,
    pub layers_downloaded: usize,
}

impl PullSummary {
    /// Archive entries in write order: config, layer directories with their
    /// `layer.tar`, then `manifest.json`. Repeated layers appear once.
    fn archive_entries(&self) -> Vec<String> {
        let mut entries = vec![self.config.clone()];
        let mut seen = HashSet::new();
        for layer in &self.layers {
            if !seen.insert(layer.as_str()) {
                continue;
            }
            if let Some((dir, _)) = layer.split_once('/') {
                entries.push(dir.to_string());
            }
            entries.push(layer.clone());
        }
        entries.push(MANIFEST_FILE.to_string());
        entries
    }
}

/// Drives one pull session against a registry
pub struct ImageAssembler<T> {
    transport: RegistryTransport<T>,
    cache: LayerCache,
    plain_http: bool,
    verify_digests: bool,
}

impl ImageAssembler<ReqwestTransport> {
    /// Build an assembler talking to real registries over reqwest
    pub fn from_options(options: &PullOptions) -> Result<Self> {
        let http = ReqwestTransport::new(&HttpClientOptions::from(options))?;
        let credentials = Credentials::new(options.username.clone(), options.password.clone());
        let cache = LayerCache::new(&options.cache_dir, options.verify_digests)?;

        Ok(Self::new(
            RegistryTransport::new(http, credentials),
            cache,
            options.plain_http,
            options.verify_digests,
        ))
    }
}

impl<T: HttpTransport> ImageAssembler<T> {
    pub fn new(
        transport: RegistryTransport<T>,
        cache: LayerCache,
        plain_http: bool,
        verify_digests: bool,
    ) -> Self {
        Self {
            transport,
            cache,
            plain_http,
            verify_digests,
        }
    }

    /// Pull `reference` and write the loadable archive to `output`.
    ///
    /// The staging directory is removed on every exit path; blobs already
    /// cached before a failure stay cached.
    pub async fn pull_to_archive(&self, reference: &str, output: &Path) -> Result<PullSummary> {
        let image_ref = ImageReference::parse(reference)?;
        tracing::info!(reference = %image_ref, output = %output.display(), "Pulling image");

        let staging = tempfile::Builder::new()
            .prefix("regpull-")
            .tempdir()
            .map_err(|e| PullError::fs(&std::env::temp_dir(), e))?;

        let summary = self.stage(&image_ref, &staging).await?;
        write_archive(staging.path(), &summary.archive_entries(), output)?;

        tracing::info!(
            reference = %image_ref,
            layers = summary.layers.len(),
            cached = summary.layers_from_cache,
            downloaded = summary.layers_downloaded,
            "Image archive written"
        );
        Ok(summary)
    }

    /// Fetch manifest, config and layers into `staging` and write `manifest.json`
    async fn stage(&self, image_ref: &ImageReference, staging: &TempDir) -> Result<PullSummary> {
        let staging = staging.path();

        let manifest_url = image_ref.manifest_url(self.plain_http);
        let response = self.transport.pull(&manifest_url).await?;
        let manifest = Manifest::parse(&response.body)?;
        tracing::info!(
            config = %manifest.config.digest,
            layers = manifest.layers.len(),
            "Fetched manifest"
        );

        let config = self.stage_config(image_ref, &manifest, staging).await?;

        let mut summary = PullSummary {
            reference: image_ref.clone(),
            config,
            layers: Vec::with_capacity(manifest.layers.len()),
            layers_from_cache: 0,
            layers_downloaded: 0,
        };

        for (index, layer) in manifest.layers.iter().enumerate() {
            tracing::info!(
                digest = %layer.digest,
                layer = index + 1,
                total = manifest.layers.len(),
                "Fetching layer"
            );

            let url = image_ref.blob_url(self.plain_http, &layer.digest);
            let transport = &self.transport;
            let blob = self
                .cache
                .ensure_cached(&layer.digest, |mut writer| async move {
                    transport.pull_to(&url, &mut writer).await?;
                    Ok::<_, PullError>(writer)
                })
                .await?;

            if blob.from_cache {
                summary.layers_from_cache += 1;
            } else {
                summary.layers_downloaded += 1;
            }

            let layer_dir = staging.join(layer.digest_hex());
            std::fs::create_dir_all(&layer_dir).map_err(|e| PullError::fs(&layer_dir, e))?;
            let layer_path = layer_dir.join(LAYER_FILE);
            std::fs::copy(&blob.path, &layer_path).map_err(|e| PullError::fs(&layer_path, e))?;

            summary
                .layers
                .push(format!("{}/{}", layer.digest_hex(), LAYER_FILE));
        }

        let entry = ArchiveManifestEntry {
            config: summary.config.clone(),
            repo_tags: Vec::new(),
            layers: summary.layers.clone(),
        };
        let manifest_path = staging.join(MANIFEST_FILE);
        std::fs::write(&manifest_path, manifest_json(&entry)?)
            .map_err(|e| PullError::fs(&manifest_path, e))?;

        Ok(summary)
    }

    /// Fetch the config blob and store it as `<hex>.json`; returns the file name
    async fn stage_config(
        &self,
        image_ref: &ImageReference,
        manifest: &Manifest,
        staging: &Path,
    ) -> Result<String> {
        let digest = &manifest.config.digest;
        let response = self
            .transport
            .pull(&image_ref.blob_url(self.plain_http, digest))
            .await?;

        if self.verify_digests {
            verify_digest(digest, &response.body)?;
        }

        // Validate, but store the bytes as received: the image ID is the
        // hash of this exact content.
        serde_json::from_slice::<serde_json::Value>(&response.body)
            .map_err(|e| PullError::json("image config", e))?;

        let file_name = format!("{}.json", manifest.config.digest_hex());
        let config_path = staging.join(&file_name);
        std::fs::write(&config_path, &response.body).map_err(|e| PullError::fs(&config_path, e))?;

        Ok(file_name)
    }
}

/// Pull `image` into a loadable archive at `output`
pub async fn pull_image(image: &str, output: &Path, options: &PullOptions) -> Result<PullSummary> {
    ImageAssembler::from_options(options)?
        .pull_to_archive(image, output)
        .await
}
