//! devmind - Code Snippet Manager
//!
//! Stores code snippets with tags in a local JSON file and sends code to an
//! OpenAI-compatible chat endpoint to explain it or suggest a refactor.
//! Refactor replies can be written back over the exact range they were asked about.
//!
//! - `models`: snippets, the store and its JSON persistence
//! - `search`: snippet filtering
//! - `handlers`: AI request building, dispatch and reply parsing
//! - `editor`: scope capture and patch application
//! - `session`: state shared between user actions

use clap::Parser;
use color_eyre::Result;

mod cli;
mod config;
mod editor;
mod error;
mod handlers;
mod logging;
mod models;
mod search;
mod session;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = cli::Cli::parse();
    logging::init_tracing(&cli.log_level, cli.log_json);

    cli::execute_cli(cli)
}
