//! Thin entry point: all the actual logic lives in the library crate so it
//! stays unit-testable without spinning up real sockets.

fn main() {
    if let Err(e) = vitrum::proxy::run() {
        eprintln!("vitrum: {}", e);
        std::process::exit(1);
    }
}
