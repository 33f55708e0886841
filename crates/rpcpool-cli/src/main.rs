use rpcpool_core::logging;

mod cli;

use crate::cli::CliCommand;

fn main() {
    // Log to the state dir when possible, stderr otherwise.
    if let Err(e) = logging::init_logging() {
        logging::init_logging_stderr();
        tracing::debug!("file logging unavailable: {e:#}");
    }

    if let Err(err) = CliCommand::run_from_args() {
        eprintln!("rpcpool error: {:#}", err);
        std::process::exit(1);
    }
}
