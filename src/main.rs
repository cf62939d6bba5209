use std::env;
use std::error::Error;
use std::process;

use clap::Parser;
use fusionlink::cli::{main_cli, Args};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let log_level = match env::var("LOG_LEVEL") {
        Ok(value) => value,
        Err(_) => "info".to_string(),
    };
    env::set_var("RUST_LOG", log_level);
    env_logger::init();
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    log::info!("Starting fusionlink v{}", VERSION);

    // Setup CTRL+C handler
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Unable to listen for shutdown signal: {e}");
            return;
        }
        log::info!("Shutting down");
        process::exit(0);
    });

    if let Err(e) = main_cli(args).await {
        log::error!("{e}");
        return Err(e);
    }

    log::info!("fusionlink stopped");

    Ok(())
}
