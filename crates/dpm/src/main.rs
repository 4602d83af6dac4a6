//! Thin CLI front-end over `dpm-sdk`. Per spec section 1 this front-end
//! (argument parsing, help rendering, version table formatting) is an
//! external collaborator the core is agnostic to — it exists here only to
//! exercise the core's public operations, not to add semantics of its
//! own. Grounded on the overall shape of
//! `examples/flox-flox/cli/flox/src/main.rs`, reduced to what a thin
//! wrapper needs.

use std::process::ExitCode;

mod cli;
mod commands;
mod logging;

fn main() -> ExitCode {
    logging::init();

    let opts = cli::dpm_cli().run();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: failed to start the async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(commands::dispatch(opts)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
