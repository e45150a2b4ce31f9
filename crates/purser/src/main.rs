// SPDX-FileCopyrightText: 2026 Purser Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Purser - a support-desk bridge bot with a credit ledger.
//!
//! This is the binary entry point.

mod seed;
mod serve;
mod status;

use clap::{Parser, Subcommand};

/// Purser - a support-desk bridge bot with a credit ledger.
#[derive(Parser, Debug)]
#[command(name = "purser", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the bridge: Telegram polling plus the webhook gateway.
    Serve,
    /// Query a running instance's health endpoint.
    Status {
        /// Emit machine-readable JSON instead of human output.
        #[arg(long)]
        json: bool,
    },
    /// Insert the default product catalog (idempotent).
    Seed,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match purser_config::load_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("purser: configuration error: {err}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) | None => serve::run_serve(config).await,
        Some(Commands::Status { json }) => status::run_status(&config, json).await,
        Some(Commands::Seed) => seed::run_seed(&config).await,
    };

    if let Err(err) = result {
        eprintln!("purser: {err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        super::Cli::command().debug_assert();
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = purser_config::load_config_from_str("")
            .expect("default config should be valid");
        assert_eq!(config.agent.name, "purser");
    }
}
