use miette::{IntoDiagnostic, Result};
use strata_resolver::IndexResolver;

use super::open_resolver;

pub struct ResolveNameArgs {
    pub root: String,
    pub index: String,
    pub name: String,
}

pub fn resolve_name(args: ResolveNameArgs) -> Result<()> {
    let mut index = IndexResolver::new(open_resolver(&args.root)?);
    let doc = index
        .open_index_xml(&args.index, &args.name)
        .into_diagnostic()?;
    println!("{}", doc.to_xml());

    Ok(())
}
