pub mod handlers;

use crate::logging;
use crate::presentation::cli::{Cli, Commands};
use clap::Parser;
use edb_core::error::Result;
use std::process::ExitCode;

pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::init(cli.quiet, cli.log_file.as_deref())?;
    match cli.command {
        Commands::Extract {
            archive,
            dest,
            no_decompress,
            duplicates,
            report,
        } => handlers::handle_extract(
            archive,
            dest,
            no_decompress,
            duplicates.link_duplicates,
            duplicates.skip_duplicates,
            report,
        ),
        Commands::List { archive, json } => handlers::handle_list(archive, json),
        Commands::Blocks { path } => handlers::handle_blocks(path),
        Commands::Sheet {
            file,
            entity,
            index,
        } => handlers::handle_sheet(file, entity, index),
    }
}
