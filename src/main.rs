//! CLI for filecast
//!
//! Subcommands:
//! - `start`: run the relay server

use clap::Parser;
use filecast::config::load_config;
use filecast::transport::server::start_relay_server;
use filecast::utils::logging;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "filecast")]
enum Command {
    /// Start the relay server
    Start,
}

#[tokio::main]
async fn main() {
    let cmd = match Command::try_parse() {
        Ok(cmd) => cmd,
        Err(e) => {
            println!("{e}");
            println!("Usage: filecast start");
            return;
        }
    };

    match cmd {
        Command::Start => {
            if let Err(e) = run_server().await {
                // Configuration errors happen before logging is set up.
                logging::init("info");
                error!("Server failed: {}", e);
                std::process::exit(1);
            }
        }
    }
}

async fn run_server() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = load_config()?;
    logging::init(&config.logging.level);

    tokio::select! {
        result = start_relay_server(config) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    Ok(())
}
