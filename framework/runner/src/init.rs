use crate::cli::CrosswindScenarioCli;
use clap::Parser;

/// Initialise the CLI and logging for the Crosswind runner.
pub fn init() -> CrosswindScenarioCli {
    env_logger::init();

    CrosswindScenarioCli::parse()
}
