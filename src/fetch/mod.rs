// Module declarations
pub mod http;
pub mod oci;
mod options;
mod pull_error;

// Public re-exports
pub use oci::pull_image;
pub use options::{default_cache_dir, HttpClientOptions, PullOptions};
pub use pull_error::{PullError, Result, TransportErrorKind};
