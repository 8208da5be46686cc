use std::io::Write;

use miette::{IntoDiagnostic, Result};

use super::open_resolver;

pub struct CatAssetArgs {
    pub root: String,
    pub path: String,
}

pub fn cat_asset(args: CatAssetArgs) -> Result<()> {
    let mut resolver = open_resolver(&args.root)?;
    let bytes = resolver.open_first(&args.path).into_diagnostic()?;

    // Raw bytes go straight through, the asset may not be text.
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&bytes).into_diagnostic()?;
    stdout.flush().into_diagnostic()?;

    Ok(())
}
