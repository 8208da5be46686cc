//! Catalog/data archive reading for layered game installations.
//!
//! Game content is shipped as *catalog/data pairs*: a plain-text catalog
//! (`.cat`) listing relative paths and sizes, and a paired data blob (`.dat`)
//! holding the raw concatenation of those files in catalog order. This crate
//! scans a directory for such pairs and serves byte-range reads out of them:
//!
//! - **Deferred parsing**: catalogs are queued at scan time and parsed one at
//!   a time, only when a lookup misses the entry table. Installations with
//!   dozens of archives pay nothing for the ones never touched.
//! - **First-parsed-wins**: within one [`ArchiveIndex`], the first catalog to
//!   supply a given path keeps it; later duplicates are ignored.
//! - **Stateless reads**: every [`read`](ArchiveIndex::read) opens, seeks,
//!   reads, and closes the backing data file. No descriptors are held between
//!   calls.

mod archive;
mod error;

pub use archive::{ArchiveEntry, ArchiveIndex};
pub use error::{CatalogError, Result};
