//! Argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "fieldtree",
    version,
    about = "Edit nested JSON/TOML documents through a field-tree schema"
)]
/// Command line of `fieldtree`.
pub struct Cli {
    /// Raise log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Editor settings file (default: `.fieldtree.toml` if present).
    #[arg(long, value_name = "TOML", global = true)]
    pub config: Option<PathBuf>,

    /// Schema file (default: `<doc stem>-schema.json` next to the document).
    #[arg(long, value_name = "FILE", global = true)]
    pub schema: Option<PathBuf>,

    /// Document file (`.json` or `.toml`).
    #[arg(long, value_name = "FILE", global = true)]
    pub doc: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the resolved field tree.
    Show {
        /// Nest scope to show instead of the root.
        #[arg(long, value_name = "ADDRESS")]
        scope: Option<String>,
    },
    /// Print the value at an address.
    Get { address: String },
    /// Set a leaf; the value is parsed as JSON, falling back to a string.
    Set { address: String, value: String },
    /// Append an item to a list field.
    Add { address: String },
    /// Delete item `index` from a list field.
    Delete { address: String, index: usize },
    /// Swap two neighbouring items of a list field.
    Swap {
        address: String,
        from: usize,
        to: usize,
    },
    /// Lint the schema.
    Check,
    /// Print the JSON Schema of the editor settings file.
    ConfigSchema,
}
