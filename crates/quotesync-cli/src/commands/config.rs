use std::process::ExitCode;

use quotesync_core::SyncConfig;

use crate::error::CliError;
use crate::output;

pub fn run(config: &SyncConfig, pretty: bool) -> Result<ExitCode, CliError> {
    output::render(config, pretty)?;
    Ok(ExitCode::SUCCESS)
}
