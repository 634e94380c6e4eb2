use clap::Parser;
use std::process::ExitCode;

use freecomment::cli::{self, Cli};

fn main() -> ExitCode {
    match cli::run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("freecomment: {e}");
            ExitCode::from(2)
        }
    }
}
