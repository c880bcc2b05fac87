//! Narrow CLI surface: a single `dev` subcommand. Argument parsing,
//! help text, and the rest of a fuller command surface live outside
//! this crate's scope.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "wu", about = "Single-binary microfrontend dev server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the dev server.
    Dev {
        #[arg(long, default_value = ".")]
        root: PathBuf,

        #[arg(long, default_value_t = 4321)]
        port: u16,
    },
}
