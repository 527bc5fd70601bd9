// Library module for regpull
// This exposes the public API for integration tests and potential library usage

pub mod fetch;

// Re-export the main public API
pub use fetch::{pull_image, PullError, PullOptions};
