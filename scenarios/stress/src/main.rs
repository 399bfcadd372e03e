use http_crosswind_runner::prelude::*;
use std::process::ExitCode;

fn main() -> CrosswindResult<ExitCode> {
    let summary = run(stress::scenario(init()))?;

    Ok(exit_code(&summary))
}
