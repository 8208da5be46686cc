use colored::Colorize;
use miette::{IntoDiagnostic, Result};
use serde_json::to_string_pretty;

use super::open_resolver;

pub struct PrintModsArgs {
    pub root: String,
    pub json: bool,
}

pub fn print_mods(args: PrintModsArgs) -> Result<()> {
    let resolver = open_resolver(&args.root)?;

    if args.json {
        println!(
            "{}",
            to_string_pretty(resolver.descriptors()).into_diagnostic()?
        );
        return Ok(());
    }

    if !resolver.has_active_mods() {
        println!("{}", "No mods installed.".dimmed());
        return Ok(());
    }

    println!(
        "{} {}",
        "Installed mods:".bright_blue().bold(),
        format!("({})", resolver.descriptors().len()).dimmed()
    );
    println!("{}", resolver.mod_table());

    Ok(())
}
