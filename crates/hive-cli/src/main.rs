//! CLI entrypoint for the hive plugin host.
//!
//! The binary delegates to [`hive_cli::run`], which parses arguments, starts
//! the requested plugin, performs one call and prints the reply.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    hive_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
