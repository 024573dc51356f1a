//! Thin process entry point: hand `argv` to [`bfelfx64::cli::run`] and map
//! the result onto an exit code. All real work happens in the library.

use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match bfelfx64::cli::run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("bfelfx64: {err:#}");
            ExitCode::FAILURE
        }
    }
}
