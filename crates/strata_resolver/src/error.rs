//! Error types for layered asset resolution.
//!
//! All fallible functions in this crate return [`Result<T>`], which uses
//! [`Error`] as the error type. Per-layer XML parse failures during merging
//! are deliberately *not* represented here: they are absorbed (and
//! debug-logged) so that one malformed mod file cannot break resolution.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during layered asset resolution.
#[derive(Error, Debug)]
pub enum Error {
    /// Filesystem I/O failed (loose-file reads, directory enumeration).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the `strata_catalog` crate while scanning or reading an
    /// archive.
    #[error("catalog error: {0}")]
    Catalog(#[from] strata_catalog::CatalogError),

    /// The requested path exists in no layer. Scoped to the single request.
    #[error("asset not found in any layer: {path}")]
    NotFound { path: String },

    /// A symbolic name is absent from a fully-loaded index document.
    #[error("name not found in index: {name}")]
    NameNotFound { name: String },

    /// A mod's manifest file could not be parsed.
    #[error("invalid manifest {path}: {message}")]
    Manifest { path: Utf8PathBuf, message: String },

    /// The enabled mod set cannot be ordered: a required dependency is
    /// missing or the dependency graph has a cycle. Lists every mod that
    /// could not be placed.
    #[error("unresolvable mod load order; could not place: {}", unplaced.join(", "))]
    LoadOrder { unplaced: Vec<String> },

    /// The caller cancelled a multi-layer operation between layers.
    #[error("operation cancelled")]
    Cancelled,

    /// The installation root handed to the resolver is not a directory.
    #[error("invalid installation directory: {0}")]
    InvalidRoot(Utf8PathBuf),
}
