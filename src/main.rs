#[macro_use]
extern crate log;

use std::fs::OpenOptions;
use std::process::ExitCode;

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, TermLogger, TerminalMode, WriteLogger,
};

use crate::danbooru::session::AuthError;
use crate::program::Program;

mod danbooru;
mod program;

/// Exit code returned when the remote rejects the supplied credentials.
const AUTH_FAILURE: u8 = 2;

fn main() -> ExitCode {
    initialize_logger();

    match Program::new().run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{error:#}");
            if error.downcast_ref::<AuthError>().is_some() {
                ExitCode::from(AUTH_FAILURE)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

/// Initializes the logger with preset filtering.
fn initialize_logger() {
    let mut config = ConfigBuilder::new();
    config.add_filter_allow_str("danbooru_downloader");

    let log_file = match OpenOptions::new()
        .create(true)
        .append(true)
        .open("danbooru_downloader.log")
    {
        Ok(file) => file,
        Err(error) => {
            eprintln!("Failed to open the log file: {error}. Logging will only output to terminal.");
            let _ = TermLogger::init(
                LevelFilter::Info,
                Config::default(),
                TerminalMode::Mixed,
                ColorChoice::Auto,
            );
            return;
        }
    };

    if let Err(error) = CombinedLogger::init(vec![
        TermLogger::new(
            LevelFilter::Info,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::max(), config.build(), log_file),
    ]) {
        eprintln!(
            "Failed to initialize combined logger: {error}. Falling back to terminal-only logging."
        );
        let _ = TermLogger::init(
            LevelFilter::Info,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        );
    }
}
