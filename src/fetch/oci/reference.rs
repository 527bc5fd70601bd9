/// Image reference parsing
///
/// A reference has the form `registry/repository[:tag]`. Parsing is purely
/// lexical: everything before the first `/` is the registry host, no
/// Docker Hub defaults are applied and nothing is validated beyond the
/// presence of both components.
use std::fmt;

use crate::fetch::pull_error::{PullError, Result};

const DEFAULT_TAG: &str = "latest";

/// Parsed image reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry host, possibly with a port (e.g., "gcr.io", "localhost:5000")
    pub registry: String,
    /// Slash-separated repository path (e.g., "library/nginx")
    pub repository: String,
    /// Tag, "latest" when none was given
    pub tag: String,
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

impl ImageReference {
    /// Parse an image reference string
    ///
    /// Examples:
    /// - "index.docker.io/library/nginx" -> index.docker.io, library/nginx, latest
    /// - "gcr.io/distroless/cc:nonroot" -> gcr.io, distroless/cc, nonroot
    /// - "localhost:5000/team/app:v2" -> localhost:5000, team/app, v2
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        let (registry, remainder) = input.split_once('/').ok_or_else(|| {
            PullError::ReferenceFormat {
                reference: input.to_string(),
                reason: "expected 'registry/repository[:tag]'".to_string(),
            }
        })?;

        if registry.is_empty() {
            return Err(PullError::ReferenceFormat {
                reference: input.to_string(),
                reason: "empty registry host".to_string(),
            });
        }

        // The last ':'-segment is the tag; anything before it is the repository
        let (repository, tag) = match remainder.rsplit_once(':') {
            Some((repository, tag)) => (repository, tag),
            None => (remainder, DEFAULT_TAG),
        };

        if repository.is_empty() {
            return Err(PullError::ReferenceFormat {
                reference: input.to_string(),
                reason: "empty repository".to_string(),
            });
        }

        if tag.is_empty() {
            return Err(PullError::ReferenceFormat {
                reference: input.to_string(),
                reason: "empty tag".to_string(),
            });
        }

        Ok(Self {
            registry: registry.to_string(),
            repository: repository.to_string(),
            tag: tag.to_string(),
        })
    }

    /// Base URL of the registry API
    pub fn registry_url(&self, plain_http: bool) -> String {
        let scheme = if plain_http { "http" } else { "https" };
        format!("{}://{}", scheme, self.registry)
    }

    /// `<base>/v2/<repository>/manifests/<tag>`
    pub fn manifest_url(&self, plain_http: bool) -> String {
        format!(
            "{}/v2/{}/manifests/{}",
            self.registry_url(plain_http),
            self.repository,
            self.tag
        )
    }

    /// `<base>/v2/<repository>/blobs/<digest>`
    pub fn blob_url(&self, plain_http: bool, digest: &str) -> String {
        format!(
            "{}/v2/{}/blobs/{}",
            self.registry_url(plain_http),
            self.repository,
            digest
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_tag() {
        let r = ImageReference::parse("index.docker.io/library/nginx").unwrap();
        assert_eq!(r.registry, "index.docker.io");
        assert_eq!(r.repository, "library/nginx");
        assert_eq!(r.tag, "latest");
    }

    #[test]
    fn test_parse_explicit_tag() {
        let r = ImageReference::parse("gcr.io/distroless/cc:latest").unwrap();
        assert_eq!(r.registry, "gcr.io");
        assert_eq!(r.repository, "distroless/cc");
        assert_eq!(r.tag, "latest");

        let r = ImageReference::parse("gcr.io/distroless/cc:nonroot").unwrap();
        assert_eq!(r.tag, "nonroot");
    }

    #[test]
    fn test_parse_registry_with_port() {
        let r = ImageReference::parse("localhost:5000/team/app:v2").unwrap();
        assert_eq!(r.registry, "localhost:5000");
        assert_eq!(r.repository, "team/app");
        assert_eq!(r.tag, "v2");
    }

    #[test]
    fn test_parse_registry_with_port_no_tag() {
        let r = ImageReference::parse("localhost:5000/app").unwrap();
        assert_eq!(r.registry, "localhost:5000");
        assert_eq!(r.repository, "app");
        assert_eq!(r.tag, "latest");
    }

    #[test]
    fn test_parse_is_purely_lexical() {
        // No Docker Hub expansion: the first component is always the registry
        let r = ImageReference::parse("library/nginx:1.25").unwrap();
        assert_eq!(r.registry, "library");
        assert_eq!(r.repository, "nginx");
        assert_eq!(r.tag, "1.25");
    }

    #[test]
    fn test_parse_without_slash_fails() {
        let err = ImageReference::parse("nginx:latest").unwrap_err();
        assert!(matches!(err, PullError::ReferenceFormat { .. }));
    }

    #[test]
    fn test_parse_empty_components_fail() {
        assert!(ImageReference::parse("/library/nginx").is_err());
        assert!(ImageReference::parse("gcr.io/").is_err());
        assert!(ImageReference::parse("gcr.io/:tag").is_err());

        let err = ImageReference::parse("gcr.io/app:").unwrap_err();
        assert!(matches!(err, PullError::ReferenceFormat { ref reason, .. } if reason == "empty tag"));
    }

    #[test]
    fn test_urls() {
        let r = ImageReference::parse("gcr.io/distroless/cc:nonroot").unwrap();
        assert_eq!(
            r.manifest_url(false),
            "https://gcr.io/v2/distroless/cc/manifests/nonroot"
        );
        assert_eq!(
            r.blob_url(true, "sha256:abc"),
            "http://gcr.io/v2/distroless/cc/blobs/sha256:abc"
        );
        assert_eq!(r.to_string(), "gcr.io/distroless/cc:nonroot");
    }
}
