//! relgate-registry: package index integration
//!
//! Implements [`relgate_state::PackageRegistry`] against a PyPI-compatible
//! index. Existence checks go through the index JSON API; uploads are
//! delegated to an external upload command (by default `twine`).

pub mod error;
pub mod index;

pub use error::RegistryError;
pub use index::{classify_upload_failure, IndexClient, IndexConfig};

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
