// SPDX-FileCopyrightText: 2026 Purser Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The product catalog: static reference data mapping a Stripe price id
//! to a credit or time grant.

use purser_core::{ProductKind, PurserError};
use rusqlite::params;
use tracing::info;

use crate::database::{map_tr_err, Database};
use crate::models::{parse_column, ProductRecord};

const PRODUCT_COLUMNS: &str = "id, stripe_price_id, product_type, name, description, amount, \
     price_usd_cents, sort_order, is_active";

fn map_product_row(row: &rusqlite::Row<'_>) -> Result<ProductRecord, rusqlite::Error> {
    Ok(ProductRecord {
        id: row.get(0)?,
        stripe_price_id: row.get(1)?,
        product_type: parse_column(2, row.get::<_, String>(2)?)?,
        name: row.get(3)?,
        description: row.get(4)?,
        amount: row.get(5)?,
        price_usd_cents: row.get(6)?,
        sort_order: row.get(7)?,
        is_active: row.get(8)?,
    })
}

/// A catalog entry to insert during seeding.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub stripe_price_id: String,
    pub product_type: ProductKind,
    pub name: String,
    pub description: Option<String>,
    pub amount: i64,
    pub price_usd_cents: i64,
    pub sort_order: i64,
}

/// Read-mostly catalog of purchasable grants.
#[derive(Clone)]
pub struct Catalog {
    db: Database,
}

impl Catalog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Looks up a catalog entry by its Stripe price id.
    pub async fn find_by_price_id(
        &self,
        price_id: &str,
    ) -> Result<Option<ProductRecord>, PurserError> {
        let price_id = price_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let result = conn.query_row(
                    &format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE stripe_price_id = ?1"),
                    params![price_id],
                    map_product_row,
                );
                match result {
                    Ok(product) => Ok(Some(product)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(map_tr_err)
    }

    /// Lists active products in display order.
    pub async fn list_active(&self) -> Result<Vec<ProductRecord>, PurserError> {
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {PRODUCT_COLUMNS} FROM products
                     WHERE is_active = 1 ORDER BY sort_order, id"
                ))?;
                let rows = stmt.query_map([], map_product_row)?;
                rows.collect()
            })
            .await
            .map_err(map_tr_err)
    }

    /// Inserts catalog entries, skipping price ids that already exist.
    /// Returns the number of newly inserted rows.
    pub async fn seed(&self, products: &[NewProduct]) -> Result<usize, PurserError> {
        let products = products.to_vec();
        let inserted = self
            .db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                let mut inserted = 0;
                for product in &products {
                    inserted += conn.execute(
                        "INSERT INTO products
                         (stripe_price_id, product_type, name, description, amount,
                          price_usd_cents, sort_order)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                         ON CONFLICT (stripe_price_id) DO NOTHING",
                        params![
                            product.stripe_price_id,
                            product.product_type.to_string(),
                            product.name,
                            product.description,
                            product.amount,
                            product.price_usd_cents,
                            product.sort_order,
                        ],
                    )?;
                }
                Ok(inserted)
            })
            .await
            .map_err(map_tr_err)?;
        if inserted > 0 {
            info!(inserted, "catalog seeded");
        }
        Ok(inserted)
    }
}

/// The default catalog, used by `purser seed` against a fresh database.
pub fn default_products() -> Vec<NewProduct> {
    vec![
        NewProduct {
            stripe_price_id: "price_10credits".into(),
            product_type: ProductKind::Credits,
            name: "10 Credits Pack".into(),
            description: Some("Perfect for light usage - 10 message credits".into()),
            amount: 10,
            price_usd_cents: 500,
            sort_order: 1,
        },
        NewProduct {
            stripe_price_id: "price_25credits".into(),
            product_type: ProductKind::Credits,
            name: "25 Credits Pack".into(),
            description: Some("Great value - 25 message credits".into()),
            amount: 25,
            price_usd_cents: 1000,
            sort_order: 2,
        },
        NewProduct {
            stripe_price_id: "price_50credits".into(),
            product_type: ProductKind::Credits,
            name: "50 Credits Pack".into(),
            description: Some("Best value - 50 message credits".into()),
            amount: 50,
            price_usd_cents: 1800,
            sort_order: 3,
        },
        NewProduct {
            stripe_price_id: "price_7days".into(),
            product_type: ProductKind::Time,
            name: "7 Days Access".into(),
            description: Some("Unlimited messages for 7 days".into()),
            amount: 7 * 24 * 3600,
            price_usd_cents: 1500,
            sort_order: 4,
        },
        NewProduct {
            stripe_price_id: "price_30days".into(),
            product_type: ProductKind::Time,
            name: "30 Days Access".into(),
            description: Some("Unlimited messages for 30 days".into()),
            amount: 30 * 24 * 3600,
            price_usd_cents: 5000,
            sort_order: 5,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> Catalog {
        let db = Database::open_in_memory().await.unwrap();
        Catalog::new(db)
    }

    #[tokio::test]
    async fn seed_then_lookup_by_price_id() {
        let catalog = setup().await;
        let inserted = catalog.seed(&default_products()).await.unwrap();
        assert_eq!(inserted, 5);

        let product = catalog
            .find_by_price_id("price_25credits")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(product.product_type, ProductKind::Credits);
        assert_eq!(product.amount, 25);
        assert_eq!(product.price_usd_cents, 1000);
        assert!(product.is_active);

        assert!(catalog.find_by_price_id("price_bogus").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn seed_is_idempotent() {
        let catalog = setup().await;
        assert_eq!(catalog.seed(&default_products()).await.unwrap(), 5);
        assert_eq!(catalog.seed(&default_products()).await.unwrap(), 0);
        assert_eq!(catalog.list_active().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn list_active_respects_sort_order() {
        let catalog = setup().await;
        catalog.seed(&default_products()).await.unwrap();
        let products = catalog.list_active().await.unwrap();
        let orders: Vec<i64> = products.iter().map(|p| p.sort_order).collect();
        let mut sorted = orders.clone();
        sorted.sort();
        assert_eq!(orders, sorted);
    }
}
