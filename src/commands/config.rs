//! Configuration file commands.

use std::path::Path;
use std::process::ExitCode;

use ws_keeper::config::{default, xdg, ConfigLoader};

/// Writes the commented default config file.
pub(crate) fn run_config_init(force: bool) -> ExitCode {
    match default::create_default_config(force) {
        Ok(path) => {
            println!("Created configuration at {}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Config error: {e}");
            ExitCode::FAILURE
        }
    }
}

pub(crate) fn run_config_path() -> ExitCode {
    println!("{}", xdg::config_path().display());
    ExitCode::SUCCESS
}

/// Parses and validates the config file, printing the effective values.
pub(crate) fn run_config_validate(config_path: Option<&Path>) -> ExitCode {
    match ConfigLoader::load(config_path) {
        Ok(config) => {
            println!("Configuration is valid");
            println!("{config:#?}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Config error: {e}");
            ExitCode::FAILURE
        }
    }
}
