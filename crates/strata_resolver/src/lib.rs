//! Layered asset resolution for modded game installations.
//!
//! This crate answers one question: given an installation root plus any
//! number of installed mods, what are the effective contents of an asset
//! path? It supports:
//!
//! - **Layer priority**: the base install is the lowest layer, each enabled
//!   mod stacks one layer on top in dependency order
//! - **First-match and merge-all lookups**: raw assets resolve to the
//!   highest layer that holds them, XML assets merge every layer's
//!   contribution bottom-up
//! - **Diff patching**: a layer's XML contribution may be a `<diff>`
//!   envelope of `add`/`replace`/`remove` instructions instead of a full
//!   document
//! - **Symbolic names**: index documents map component/macro names to asset
//!   paths, resolved through [`IndexResolver`]
//!
//! # Example
//!
//! ```no_run
//! use strata_resolver::LayeredAssetResolver;
//! use camino::Utf8Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut resolver = LayeredAssetResolver::open(Utf8Path::new("/games/x4"))?;
//!
//! // Highest-priority raw bytes.
//! let bytes = resolver.open_first("assets/textures/hull.dds")?;
//!
//! // Every layer's XML folded into one tree.
//! let doc = resolver.open_merged_xml("libraries/wares.xml")?;
//! println!("{}", doc.to_xml());
//! # Ok(())
//! # }
//! ```

pub mod dom;
pub mod error;
pub mod index;
pub mod layer;
pub mod manifest;
pub mod patch;
pub mod resolver;
pub mod selector;

// Re-export main types
pub use dom::{local_name, NodeId, XmlDocument, XmlError, XmlNode};
pub use error::{Error, Result};
pub use index::IndexResolver;
pub use layer::{Layer, BASE_LAYER};
pub use manifest::{
    sort_load_order, DependencyDeclaration, ModDescriptor, ModManifest, MANIFEST_FILE,
};
pub use patch::{merge, DIFF_ROOT};
pub use resolver::{LayeredAssetResolver, EXTENSIONS_DIR};

pub use tokio_util::sync::CancellationToken;
