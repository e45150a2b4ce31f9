// SPDX-FileCopyrightText: 2026 Purser Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `purser serve` command implementation.
//!
//! Wires the whole bridge together: storage (migrations run on open),
//! the four stores, the Telegram surface, the routing engine, the
//! payment processor, the webhook gateway, and the long-polling inbound
//! loop. Everything is constructed here and injected explicitly; there
//! is no ambient global state.

use std::sync::Arc;
use std::time::Duration;

use purser_config::PurserConfig;
use purser_core::{PurserError, WorkspaceId};
use purser_gateway::{start_server, GatewayState, ServerConfig};
use purser_payments::PaymentProcessor;
use purser_router::RoutingEngine;
use purser_storage::{Catalog, ConversationDirectory, Database, LedgerStore, TransactionLog};
use purser_telegram::{TelegramListener, TelegramSurface};
use teloxide::Bot;
use tracing::{error, info};

/// Runs the `purser serve` command until a shutdown signal arrives.
pub async fn run_serve(config: PurserConfig) -> Result<(), PurserError> {
    init_tracing(&config.agent.log_level);
    config.validate_for_serve()?;

    info!(name = %config.agent.name, "starting purser serve");

    let workspace = config
        .telegram
        .workspace_id
        .map(WorkspaceId)
        .ok_or_else(|| PurserError::Config("telegram.workspace_id is required".into()))?;
    let bot_token = config
        .telegram
        .bot_token
        .clone()
        .ok_or_else(|| PurserError::Config("telegram.bot_token is required".into()))?;
    let webhook_secret = config
        .stripe
        .webhook_secret
        .clone()
        .ok_or_else(|| PurserError::Config("stripe.webhook_secret is required".into()))?;

    let db = Database::open(&config.storage.database_path).await?;
    info!(path = %config.storage.database_path, "storage ready");

    let ledger = LedgerStore::new(db.clone());
    let txlog = TransactionLog::new(db.clone());
    let catalog = Catalog::new(db.clone());
    let directory = ConversationDirectory::new(db.clone());

    let bot = Bot::new(bot_token);
    let surface = Arc::new(TelegramSurface::new(bot.clone()));

    let engine = Arc::new(RoutingEngine::new(
        directory,
        ledger.clone(),
        surface,
        workspace,
        config.telegram.debit_per_message,
    ));

    let processor = Arc::new(PaymentProcessor::new(
        ledger,
        txlog,
        catalog,
        webhook_secret,
        Duration::from_secs(config.stripe.signature_tolerance_secs),
    ));

    let gateway_state = GatewayState {
        processor,
        router: Arc::clone(&engine),
        db: db.clone(),
        start_time: std::time::Instant::now(),
    };
    let server_config = ServerConfig {
        host: config.gateway.host.clone(),
        port: config.gateway.port,
    };
    let gateway = tokio::spawn(async move { start_server(&server_config, gateway_state).await });

    let listener = TelegramListener::new(
        bot,
        Arc::clone(&engine),
        workspace,
        config.telegram.admin_user_ids.clone(),
    );
    let polling = tokio::spawn(listener.run());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        result = gateway => {
            match result {
                Ok(Err(err)) => error!(error = %err, "gateway exited with error"),
                Ok(Ok(())) => info!("gateway exited"),
                Err(err) => error!(error = %err, "gateway task panicked"),
            }
        }
        _ = polling => {
            error!("telegram polling stopped unexpectedly");
        }
    }

    db.close().await?;
    info!("shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber from config, honoring RUST_LOG.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("purser={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
