//! The lobby plugin, built inside this package for the end-to-end tests.

use std::io::{self, Write};

fn main() {
    if let Err(error) = hive_lobby::run() {
        writeln!(io::stderr().lock(), "{error}").ok();
        std::process::exit(1);
    }
}
