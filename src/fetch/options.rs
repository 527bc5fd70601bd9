use std::path::PathBuf;

/// Directory under the home directory used when no cache root is given
const DEFAULT_CACHE_SUBDIR: &str = ".regpull/layers";

/// Options for HTTP client setup
#[derive(Debug, Clone)]
pub struct HttpClientOptions {
    pub insecure_tls: bool,
    pub cacert: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for HttpClientOptions {
    fn default() -> Self {
        Self {
            insecure_tls: false,
            cacert: None,
            timeout_secs: 300,
        }
    }
}

/// Options for a single image pull
#[derive(Debug, Clone)]
pub struct PullOptions {
    pub http: HttpClientOptions,
    /// Root of the content-addressed layer cache
    pub cache_dir: PathBuf,
    /// Talk to the registry over http:// instead of https://
    pub plain_http: bool,
    /// Check sha256 digests of downloaded blobs before trusting them
    pub verify_digests: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for PullOptions {
    fn default() -> Self {
        Self {
            http: HttpClientOptions::default(),
            cache_dir: default_cache_dir(),
            plain_http: false,
            verify_digests: true,
            username: None,
            password: None,
        }
    }
}

impl From<&PullOptions> for HttpClientOptions {
    fn from(opts: &PullOptions) -> Self {
        opts.http.clone()
    }
}

/// `$HOME/.regpull/layers`, or a relative `.regpull/layers` when no home
/// directory can be determined.
pub fn default_cache_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_CACHE_SUBDIR))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_SUBDIR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cache_dir_suffix() {
        assert!(default_cache_dir().ends_with(".regpull/layers"));
    }

    #[test]
    fn test_pull_options_defaults() {
        let options = PullOptions::default();
        assert!(options.verify_digests);
        assert!(!options.plain_http);
        assert_eq!(options.http.timeout_secs, 300);
        assert!(options.username.is_none());
    }
}
