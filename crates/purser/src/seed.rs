// SPDX-FileCopyrightText: 2026 Purser Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `purser seed` command implementation.
//!
//! Inserts the default product catalog into the configured database.
//! Safe to run repeatedly; existing price ids are left untouched.

use purser_config::PurserConfig;
use purser_core::PurserError;
use purser_storage::{catalog::default_products, Catalog, Database};

/// Run the `purser seed` command.
pub async fn run_seed(config: &PurserConfig) -> Result<(), PurserError> {
    let db = Database::open(&config.storage.database_path).await?;
    let catalog = Catalog::new(db.clone());

    let inserted = catalog.seed(&default_products()).await?;
    let total = catalog.list_active().await?.len();
    println!("seeded {inserted} new products ({total} active)");

    db.close().await?;
    Ok(())
}
