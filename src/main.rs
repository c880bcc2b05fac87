use clap::Parser;

use wu::cli::{Cli, Command};
use wu::logging::Logger;

fn main() {
    Logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Dev { root, port } => {
            if let Err(e) = wu::run_dev(root, "127.0.0.1", port) {
                Logger::error(&format!("{e:#}"));
                std::process::exit(1);
            }
        }
    }
}
