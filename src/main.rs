//! Kodegen Bundler Package - packages an application tree into
//! per-platform bundles.

use kodegen_bundler_package::cli;
use kodegen_bundler_package::cli::OutputManager;
use std::process;

#[tokio::main]
async fn main() {
    env_logger::init();

    match cli::run().await {
        Ok(exit_code) => {
            process::exit(exit_code);
        }
        Err(e) => {
            OutputManager::new(false).failure(&e);
            process::exit(1);
        }
    }
}
