//! Binary entry point for `stagefs`.

use std::process;

fn main() {
    if let Err(e) = stagefs::run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
