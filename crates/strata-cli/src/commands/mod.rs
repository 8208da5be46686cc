mod cat;
mod merge;
mod mods;
mod resolve;

pub use cat::*;
pub use merge::*;
pub use mods::*;
pub use resolve::*;

use camino::Utf8PathBuf;
use miette::{IntoDiagnostic, Result};
use strata_resolver::LayeredAssetResolver;

/// Open a resolver over the given installation root argument.
pub fn open_resolver(root: &str) -> Result<LayeredAssetResolver> {
    let root = Utf8PathBuf::from(root);
    LayeredAssetResolver::open(&root).into_diagnostic()
}
