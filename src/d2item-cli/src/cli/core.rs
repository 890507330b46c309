//! Core CLI definitions

use clap::{ArgAction, Args, Parser, Subcommand};
use d2item::{GameMode, ItemVersion, TreeStyle};
use std::path::PathBuf;

use super::edit::EditOp;

#[derive(Parser)]
#[command(name = "d2item")]
#[command(about = "Diablo II item record codec", long_about = None)]
pub struct Cli {
    /// Increase log output (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Format of the records being read
#[derive(Args, Debug, Clone, Default)]
pub struct FormatArgs {
    /// Item format version (v100, v104, v107 ... v110, v100r, v120, v140, v160)
    #[arg(long = "item-version", short = 'V', env = "D2ITEM_VERSION")]
    pub version: Option<ItemVersion>,

    /// Game mode (classic or expansion)
    #[arg(long, short, env = "D2ITEM_MODE")]
    pub mode: Option<GameMode>,
}

/// Where the records are in the input file
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Path to a file holding an item record or item list
    pub input: PathBuf,

    /// Byte offset of the first record
    #[arg(long, default_value_t = 0)]
    pub offset: usize,

    /// The input is a "JM" item list rather than a single record
    #[arg(short, long)]
    pub list: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decode records and print them as a tree
    #[command(visible_alias = "d")]
    Decode {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        format: FormatArgs,

        /// Tree key style (snake or pascal)
        #[arg(long, short)]
        style: Option<TreeStyle>,

        /// Print YAML instead of JSON
        #[arg(long)]
        yaml: bool,

        /// Write the tree to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Encode a JSON or YAML tree (an object, or an array for a list)
    #[command(visible_alias = "e")]
    Encode {
        /// Path to the tree file
        input: PathBuf,

        /// Output record file
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        format: FormatArgs,

        /// Tree key style (snake or pascal)
        #[arg(long, short)]
        style: Option<TreeStyle>,
    },

    /// Re-encode records under another format version
    Convert {
        #[command(flatten)]
        input: InputArgs,

        /// Source format version
        #[arg(long)]
        from: ItemVersion,

        /// Target format version
        #[arg(long)]
        to: ItemVersion,

        /// Source game mode
        #[arg(long, default_value = "expansion")]
        from_mode: GameMode,

        /// Target game mode (defaults to the source mode)
        #[arg(long)]
        to_mode: Option<GameMode>,

        /// Output file (defaults to overwriting the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip the backup when overwriting the input
        #[arg(long)]
        no_backup: bool,
    },

    /// Show a record's hex dump, field offsets and derived values
    #[command(visible_alias = "i")]
    Inspect {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        format: FormatArgs,
    },

    /// Edit a single record in place
    Edit {
        /// Path to the record file
        input: PathBuf,

        #[command(flatten)]
        format: FormatArgs,

        /// Output file (defaults to overwriting the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip the backup when overwriting the input
        #[arg(long)]
        no_backup: bool,

        #[command(subcommand)]
        op: EditOp,
    },

    /// Compute a file checksum
    Checksum {
        /// Path to the file
        input: PathBuf,

        /// Byte offset of a 4-byte stored checksum to read as zero
        #[arg(long)]
        field: Option<usize>,

        /// Write the computed checksum into the field
        #[arg(long, requires = "field")]
        store: bool,
    },

    /// Configure default settings
    #[command(visible_alias = "c")]
    Configure {
        /// Set the default item format version
        #[arg(long = "item-version")]
        version: Option<ItemVersion>,

        /// Set the default game mode
        #[arg(long)]
        mode: Option<GameMode>,

        /// Set the default tree key style
        #[arg(long)]
        style: Option<TreeStyle>,

        /// Enable or disable backups before overwriting files
        #[arg(long)]
        backup: Option<bool>,

        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}
