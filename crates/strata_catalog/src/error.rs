//! Error types for catalog scanning and reading.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors that can occur while scanning, parsing, or reading archives.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Filesystem I/O failed (scanning the directory, reading a catalog or
    /// data file).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catalog line did not match the `<path> <size> <field> <digest>`
    /// record shape. Fatal for the whole archive; entries already cached from
    /// other archives remain valid.
    #[error("malformed record in catalog {catalog} (line {line}): {text:?}")]
    MalformedRecord {
        catalog: Utf8PathBuf,
        line: usize,
        text: String,
    },

    /// The directory handed to [`ArchiveIndex::scan`](crate::ArchiveIndex::scan)
    /// does not exist or is not a directory.
    #[error("archive directory not found: {0}")]
    DirNotFound(Utf8PathBuf),
}
