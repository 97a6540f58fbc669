mod application;
mod logging;

mod presentation {
    pub mod cli;
}

use edb_core::error::Result;
use std::process::ExitCode;

fn main() -> Result<ExitCode> {
    application::run()
}
