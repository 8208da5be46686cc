use miette::{IntoDiagnostic, Result};

use super::open_resolver;

pub struct MergeAssetArgs {
    pub root: String,
    pub path: String,
}

pub fn merge_asset(args: MergeAssetArgs) -> Result<()> {
    let mut resolver = open_resolver(&args.root)?;
    let doc = resolver.open_merged_xml(&args.path).into_diagnostic()?;
    println!("{}", doc.to_xml());

    Ok(())
}
