use clap::{Args, Parser, Subcommand};
use edb_core::EntityKind;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "edbdev: project database inspector", long_about = None)]
pub struct Cli {
    /// Do not log to the console
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Also write logs (without colour) to this file
    #[arg(long = "log-file", global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args)]
#[group(multiple = false)]
pub struct DuplicateArgs {
    /// Hard-link entries that share content with an earlier entry
    #[arg(long)]
    pub link_duplicates: bool,

    /// Write nothing for entries that share content with an earlier entry
    #[arg(long)]
    pub skip_duplicates: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract every member file of a database
    Extract {
        archive: PathBuf,
        /// Output directory (defaults to `<archive stem>.extracted` beside the archive)
        dest: Option<PathBuf>,

        /// Keep compressed members as stored
        #[arg(long)]
        no_decompress: bool,

        #[command(flatten)]
        duplicates: DuplicateArgs,

        /// Write the extraction report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// List the file table of a database
    List {
        archive: PathBuf,

        /// Print the listing as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the block layout of extracted member files
    Blocks {
        /// A member file, or a directory searched recursively
        path: PathBuf,
    },

    /// Decode a sheet member file and print its entities as JSON
    Sheet {
        file: PathBuf,

        /// Print only one entity of this kind
        #[arg(long)]
        entity: Option<EntityKind>,

        /// 0-based index of the entity
        #[arg(long, default_value_t = 0, requires = "entity")]
        index: usize,
    },
}
