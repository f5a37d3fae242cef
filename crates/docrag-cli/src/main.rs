//! # docrag CLI
//!
//! Command-line interface for document ingestion and question answering.
//!
//! This binary provides human-friendly access to `docrag-core` functionality.
//! Run `docrag --help` for usage information.

mod cli;
mod store;
mod ui;

use std::process::ExitCode;

fn main() -> ExitCode {
    cli::run()
}
