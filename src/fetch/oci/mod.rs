/// Docker Registry v2 pull support
///
/// Fetches an image's manifest, config and layers over the registry HTTP
/// API and repackages them as a `docker load` compatible tar archive.
mod archive;
mod assembler;
mod auth;
mod layer_cache;
mod manifest;
mod reference;
mod registry;

// Public re-exports
pub use archive::{write_archive, ArchiveManifestEntry};
pub use assembler::{pull_image, ImageAssembler, PullSummary};
pub use auth::{challenge_to_token_url, AuthChallenge, Credentials};
pub use layer_cache::{cache_file_name, verify_digest, BlobWriter, CachedBlob, LayerCache};
pub use manifest::{validate_digest, Descriptor, Manifest};
pub use reference::ImageReference;
pub use registry::{RegistryTransport, MAX_REDIRECTS};
