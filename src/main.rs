//! tg - hierarchical task tracking with dependencies

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = taskgraph::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
