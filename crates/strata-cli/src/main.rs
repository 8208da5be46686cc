use clap::builder::{styling::AnsiColor, Styles};
use clap::ColorChoice;
use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use commands::{
    cat_asset, merge_asset, print_mods, resolve_name, CatAssetArgs, MergeAssetArgs, PrintModsArgs,
    ResolveNameArgs,
};
use miette::Result;

mod commands;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List installed mods and their load order
    Mods {
        /// The installation root directory
        #[arg(short, long, default_value = ".")]
        root: String,

        /// Emit machine-readable JSON instead of a table
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the highest-priority contents of an asset path
    Cat {
        /// The installation root directory
        #[arg(short, long, default_value = ".")]
        root: String,

        /// The asset path to look up
        path: String,
    },
    /// Print an XML asset merged across all layers
    Merge {
        /// The installation root directory
        #[arg(short, long, default_value = ".")]
        root: String,

        /// The asset path to merge
        path: String,
    },
    /// Resolve a symbolic name through an index document
    Resolve {
        /// The installation root directory
        #[arg(short, long, default_value = ".")]
        root: String,

        /// The index document path, e.g. index/components.xml
        #[arg(short, long)]
        index: String,

        /// The symbolic name to resolve
        name: String,
    },
}

fn parse_args() -> Args {
    // Configure colored/styled help output
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default().bold())
        .usage(AnsiColor::Green.on_default().bold())
        .literal(AnsiColor::Cyan.on_default())
        .placeholder(AnsiColor::Blue.on_default());

    let matches = Args::command()
        .styles(styles)
        .color(ColorChoice::Auto)
        .get_matches();

    Args::from_arg_matches(&matches).expect("failed to parse arguments")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args();

    match args.command {
        Commands::Mods { root, json } => print_mods(PrintModsArgs { root, json }),
        Commands::Cat { root, path } => cat_asset(CatAssetArgs { root, path }),
        Commands::Merge { root, path } => merge_asset(MergeAssetArgs { root, path }),
        Commands::Resolve { root, index, name } => {
            resolve_name(ResolveNameArgs { root, index, name })
        }
    }
}
