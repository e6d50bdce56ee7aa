//! `wick version` command.

use wick_core::pkg::PkgError;

pub fn run() -> Result<(), PkgError> {
    println!("{}", wick_core::VERSION);
    Ok(())
}
