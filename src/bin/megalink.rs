//! megalink CLI - downloads MEGA file and folder share links.

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::env;
use std::process::ExitCode;

use megalink::cli::{self, Command};

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let options = match cli::parse_args(env::args().skip(1)) {
        Ok(Command::Run(options)) => options,
        Ok(Command::Help) => {
            cli::print_usage();
            return ExitCode::SUCCESS;
        }
        Err(message) => {
            eprintln!("Error: {message}");
            eprintln!();
            cli::print_usage();
            return ExitCode::FAILURE;
        }
    };

    if cli::run(options).await {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
