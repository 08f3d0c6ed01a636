//! Configurable plugin binary driven by the end-to-end tests.

use std::io::{self, Write};

fn main() {
    if let Err(error) = hive_e2e::fixture::run(std::env::args_os()) {
        writeln!(io::stderr().lock(), "{error}").ok();
        std::process::exit(1);
    }
}
