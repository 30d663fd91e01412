//! # Inventory Repository
//!
//! The append-only movement ledger and the `on_hand_cached` counter it
//! keeps in step.
//!
//! ## One Adjustment
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    INSERT movement            ← first statement takes the write lock   │
//! │      └── UNIQUE(business, key) hit → ROLLBACK, DuplicateKey            │
//! │    UPDATE products                                                      │
//! │      SET on_hand = on_hand + Δ                                          │
//! │      WHERE ... AND (Δ >= 0 OR untracked OR on_hand + Δ >= 0)            │
//! │      RETURNING on_hand                                                  │
//! │      └── no row → ROLLBACK, InsufficientStock / NotFound                │
//! │    UPDATE movement SET on_hand_after = returned on_hand                 │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every writer of `on_hand_cached` (adjustments here, sale commits in
//! [`super::sale`]) goes through [`apply_delta`], so the floor at zero holds
//! no matter how requests interleave.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::repository::catalog::PRODUCT_SELECT;
use tally_core::types::format_timestamp;
use tally_core::{InventoryMovement, MovementReason, Product, Quantity};

pub(crate) const MOVEMENT_SELECT: &str = r#"
    SELECT
        id,
        business_id,
        product_id,
        store_id,
        quantity_delta,
        reason,
        idempotency_key,
        related_sale_id,
        note,
        created_at,
        on_hand_after
    FROM inventory_movements
"#;

/// A movement about to be written. The sign is already normalized.
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub id: String,
    pub business_id: String,
    pub product_id: String,
    pub store_id: Option<String>,
    pub quantity_delta: Quantity,
    pub reason: MovementReason,
    pub idempotency_key: String,
    pub related_sale_id: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewMovement {
    fn into_record(self, on_hand: Quantity) -> InventoryMovement {
        InventoryMovement {
            id: self.id,
            business_id: self.business_id,
            product_id: self.product_id,
            store_id: self.store_id,
            quantity_delta: self.quantity_delta.scaled(),
            reason: self.reason,
            idempotency_key: self.idempotency_key,
            related_sale_id: self.related_sale_id,
            note: self.note,
            created_at: self.created_at,
            on_hand_after: Some(on_hand.scaled()),
        }
    }
}

/// What happened to an adjustment.
#[derive(Debug, Clone)]
pub enum AppendOutcome {
    /// Movement written and counter moved.
    Applied {
        movement: InventoryMovement,
        on_hand: Quantity,
    },
    /// A movement with this `(business, key)` already exists. Nothing was
    /// written; look it up with [`InventoryRepository::find_by_key`].
    DuplicateKey,
    /// The delta would take a tracked product below zero. Nothing was
    /// written.
    InsufficientStock { on_hand: Quantity },
}

// =============================================================================
// Transaction primitives
// =============================================================================

/// Inserts a movement row. Returns `false` when the idempotency key is
/// already taken for the business.
///
/// `on_hand_after` is `None` when the counter has not moved yet; fill it in
/// with [`record_on_hand_after`] before commit.
pub(crate) async fn insert_movement(
    conn: &mut SqliteConnection,
    movement: &NewMovement,
    on_hand_after: Option<Quantity>,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO inventory_movements (
            id, business_id, product_id, store_id, quantity_delta, reason,
            idempotency_key, related_sale_id, note, created_at, on_hand_after
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&movement.id)
    .bind(&movement.business_id)
    .bind(&movement.product_id)
    .bind(&movement.store_id)
    .bind(movement.quantity_delta.scaled())
    .bind(movement.reason)
    .bind(&movement.idempotency_key)
    .bind(&movement.related_sale_id)
    .bind(&movement.note)
    .bind(format_timestamp(&movement.created_at))
    .bind(on_hand_after.map(|q| q.scaled()))
    .execute(&mut *conn)
    .await;

    match result {
        Ok(_) => Ok(true),
        Err(e) => match DbError::from(e) {
            err if err.is_unique_violation() => Ok(false),
            err => Err(err),
        },
    }
}

pub(crate) async fn record_on_hand_after(
    conn: &mut SqliteConnection,
    movement_id: &str,
    on_hand: Quantity,
) -> DbResult<()> {
    sqlx::query("UPDATE inventory_movements SET on_hand_after = ?1 WHERE id = ?2")
        .bind(on_hand.scaled())
        .bind(movement_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Moves the counter by `delta` unless that would take a tracked product
/// below zero. Returns the new value, or `None` if no row was updated.
pub(crate) async fn apply_delta(
    conn: &mut SqliteConnection,
    business_id: &str,
    product_id: &str,
    delta: Quantity,
    at: &DateTime<Utc>,
) -> DbResult<Option<Quantity>> {
    let on_hand: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE products
        SET on_hand_cached = on_hand_cached + ?1,
            updated_at = ?2
        WHERE id = ?3
          AND business_id = ?4
          AND (?1 >= 0 OR track_inventory = 0 OR on_hand_cached + ?1 >= 0)
        RETURNING on_hand_cached
        "#,
    )
    .bind(delta.scaled())
    .bind(format_timestamp(at))
    .bind(product_id)
    .bind(business_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(on_hand.map(Quantity::from_scaled))
}

/// Counter value as seen inside the caller's transaction. `None` if the
/// product does not exist for the business.
pub(crate) async fn current_on_hand(
    conn: &mut SqliteConnection,
    business_id: &str,
    product_id: &str,
) -> DbResult<Option<Quantity>> {
    let on_hand: Option<i64> = sqlx::query_scalar(
        "SELECT on_hand_cached FROM products WHERE id = ?1 AND business_id = ?2",
    )
    .bind(product_id)
    .bind(business_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(on_hand.map(Quantity::from_scaled))
}

fn parse_stored_timestamp(raw: Option<String>) -> DbResult<Option<DateTime<Utc>>> {
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| DbError::Decode(format!("timestamp '{}': {}", s, e)))
    })
    .transpose()
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for the movement ledger.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    /// Looks up a movement by its idempotency key.
    pub async fn find_by_key(
        &self,
        business_id: &str,
        idempotency_key: &str,
    ) -> DbResult<Option<InventoryMovement>> {
        let sql = format!("{MOVEMENT_SELECT} WHERE business_id = ?1 AND idempotency_key = ?2");
        let movement = sqlx::query_as::<_, InventoryMovement>(&sql)
            .bind(business_id)
            .bind(idempotency_key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(movement)
    }

    /// Writes one movement and moves the counter, atomically.
    ///
    /// ## Returns
    /// * `Applied` - both rows written
    /// * `DuplicateKey` - the key already exists, nothing written
    /// * `InsufficientStock` - tracked product would go negative, nothing
    ///   written
    /// * `Err(NotFound)` - no such product for the business
    pub async fn append_adjustment(&self, movement: &NewMovement) -> DbResult<AppendOutcome> {
        let mut tx = self.pool.begin().await?;

        if !insert_movement(&mut *tx, movement, None).await? {
            tx.rollback().await?;
            warn!(
                key = %movement.idempotency_key,
                "Movement key already used, reporting duplicate"
            );
            return Ok(AppendOutcome::DuplicateKey);
        }

        let updated = apply_delta(
            &mut *tx,
            &movement.business_id,
            &movement.product_id,
            movement.quantity_delta,
            &movement.created_at,
        )
        .await?;

        let Some(on_hand) = updated else {
            let current = current_on_hand(&mut *tx, &movement.business_id, &movement.product_id).await?;
            tx.rollback().await?;
            return match current {
                None => Err(DbError::not_found("Product", movement.product_id.clone())),
                Some(on_hand) => {
                    warn!(
                        product_id = %movement.product_id,
                        on_hand = %on_hand,
                        delta = %movement.quantity_delta,
                        "Adjustment rejected, stock would go negative"
                    );
                    Ok(AppendOutcome::InsufficientStock { on_hand })
                }
            };
        };

        record_on_hand_after(&mut *tx, &movement.id, on_hand).await?;
        tx.commit().await?;

        info!(
            movement_id = %movement.id,
            product_id = %movement.product_id,
            reason = movement.reason.as_str(),
            delta = %movement.quantity_delta,
            on_hand = %on_hand,
            "Stock adjusted"
        );

        Ok(AppendOutcome::Applied {
            movement: movement.clone().into_record(on_hand),
            on_hand,
        })
    }

    /// One page of movements, newest first, ordered by `(created_at, id)`
    /// descending. `after` is the `(created_at, id)` of the last row of the
    /// previous page.
    pub async fn list_movements(
        &self,
        business_id: &str,
        product_id: Option<&str>,
        after: Option<(DateTime<Utc>, String)>,
        limit: i64,
    ) -> DbResult<Vec<InventoryMovement>> {
        let (after_ts, after_id) = match after {
            Some((ts, id)) => (Some(format_timestamp(&ts)), Some(id)),
            None => (None, None),
        };

        let sql = format!(
            r#"{MOVEMENT_SELECT}
            WHERE business_id = ?1
              AND (?2 IS NULL OR product_id = ?2)
              AND (?3 IS NULL OR created_at < ?3 OR (created_at = ?3 AND id < ?4))
            ORDER BY created_at DESC, id DESC
            LIMIT ?5
            "#
        );

        let movements = sqlx::query_as::<_, InventoryMovement>(&sql)
            .bind(business_id)
            .bind(product_id)
            .bind(after_ts)
            .bind(after_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        debug!(count = movements.len(), "Listed movements");
        Ok(movements)
    }

    /// Active tracked products at or under their reorder point, lowest
    /// stock first.
    pub async fn list_low_stock(&self, business_id: &str, limit: i64) -> DbResult<Vec<Product>> {
        let sql = format!(
            r#"{PRODUCT_SELECT}
            WHERE p.business_id = ?1
              AND p.is_active = 1
              AND p.track_inventory = 1
              AND p.reorder_point IS NOT NULL
              AND p.on_hand_cached <= p.reorder_point
            ORDER BY p.on_hand_cached ASC, p.name ASC
            LIMIT ?2
            "#
        );

        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(business_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(products)
    }

    /// Latest product update and latest movement for the business.
    pub async fn watermark(
        &self,
        business_id: &str,
    ) -> DbResult<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
        let products: Option<String> =
            sqlx::query_scalar("SELECT MAX(updated_at) FROM products WHERE business_id = ?1")
                .bind(business_id)
                .fetch_one(&self.pool)
                .await?;

        let movements: Option<String> = sqlx::query_scalar(
            "SELECT MAX(created_at) FROM inventory_movements WHERE business_id = ?1",
        )
        .bind(business_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((parse_stored_timestamp(products)?, parse_stored_timestamp(movements)?))
    }

    /// Sum of every movement delta for a product.
    pub async fn ledger_total(&self, business_id: &str, product_id: &str) -> DbResult<Quantity> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(quantity_delta), 0)
            FROM inventory_movements
            WHERE business_id = ?1 AND product_id = ?2
            "#,
        )
        .bind(business_id)
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(Quantity::from_scaled(total))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::catalog::NewProduct;
    use crate::repository::{new_id, now};
    use tally_core::DEFAULT_BUSINESS_ID as BIZ;

    fn movement(product_id: &str, delta: i64, reason: MovementReason, key: &str) -> NewMovement {
        NewMovement {
            id: new_id(),
            business_id: BIZ.to_string(),
            product_id: product_id.to_string(),
            store_id: None,
            quantity_delta: Quantity::from_units(delta).unwrap(),
            reason,
            idempotency_key: key.to_string(),
            related_sale_id: None,
            note: None,
            created_at: now(),
        }
    }

    async fn setup() -> (Database, Product) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .catalog()
            .insert_product(&NewProduct::new(BIZ, "Soap").price_minor(300))
            .await
            .unwrap();
        (db, product)
    }

    #[tokio::test]
    async fn test_append_moves_counter_and_ledger_together() {
        let (db, product) = setup().await;
        let inventory = db.inventory();

        let outcome = inventory
            .append_adjustment(&movement(&product.id, 10, MovementReason::StockIn, "in-1"))
            .await
            .unwrap();
        match outcome {
            AppendOutcome::Applied { on_hand, movement } => {
                assert_eq!(on_hand, Quantity::from_units(10).unwrap());
                assert_eq!(movement.idempotency_key, "in-1");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        inventory
            .append_adjustment(&movement(&product.id, -4, MovementReason::StockOut, "out-1"))
            .await
            .unwrap();

        let stored = db.catalog().get_product(BIZ, &product.id).await.unwrap().unwrap();
        let total = inventory.ledger_total(BIZ, &product.id).await.unwrap();
        assert_eq!(stored.on_hand(), Quantity::from_units(6).unwrap());
        assert_eq!(total, stored.on_hand());

        let first = inventory.find_by_key(BIZ, "in-1").await.unwrap().unwrap();
        let second = inventory.find_by_key(BIZ, "out-1").await.unwrap().unwrap();
        assert_eq!(first.on_hand_after(), Some(Quantity::from_units(10).unwrap()));
        assert_eq!(second.on_hand_after(), Some(Quantity::from_units(6).unwrap()));
    }

    #[tokio::test]
    async fn test_duplicate_key_writes_nothing() {
        let (db, product) = setup().await;
        let inventory = db.inventory();

        inventory
            .append_adjustment(&movement(&product.id, 5, MovementReason::StockIn, "same"))
            .await
            .unwrap();
        let outcome = inventory
            .append_adjustment(&movement(&product.id, 5, MovementReason::StockIn, "same"))
            .await
            .unwrap();

        assert!(matches!(outcome, AppendOutcome::DuplicateKey));
        let stored = db.catalog().get_product(BIZ, &product.id).await.unwrap().unwrap();
        assert_eq!(stored.on_hand(), Quantity::from_units(5).unwrap());

        let found = inventory.find_by_key(BIZ, "same").await.unwrap().unwrap();
        assert_eq!(found.delta(), Quantity::from_units(5).unwrap());
    }

    #[tokio::test]
    async fn test_tracked_product_cannot_go_negative() {
        let (db, product) = setup().await;
        let inventory = db.inventory();

        inventory
            .append_adjustment(&movement(&product.id, 2, MovementReason::StockIn, "in"))
            .await
            .unwrap();
        let outcome = inventory
            .append_adjustment(&movement(&product.id, -3, MovementReason::StockOut, "out"))
            .await
            .unwrap();

        match outcome {
            AppendOutcome::InsufficientStock { on_hand } => {
                assert_eq!(on_hand, Quantity::from_units(2).unwrap());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        // The rejected movement was rolled back with the counter.
        assert!(inventory.find_by_key(BIZ, "out").await.unwrap().is_none());
        assert_eq!(
            inventory.ledger_total(BIZ, &product.id).await.unwrap(),
            Quantity::from_units(2).unwrap()
        );
    }

    #[tokio::test]
    async fn test_untracked_product_may_go_negative() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let service_item = db
            .catalog()
            .insert_product(&NewProduct::new(BIZ, "Gift wrap").untracked())
            .await
            .unwrap();

        let outcome = db
            .inventory()
            .append_adjustment(&movement(&service_item.id, -1, MovementReason::Adjustment, "k"))
            .await
            .unwrap();
        assert!(matches!(outcome, AppendOutcome::Applied { .. }));
    }

    #[tokio::test]
    async fn test_missing_product_is_not_found() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        // Foreign keys reject the movement before the counter is touched.
        let err = db
            .inventory()
            .append_adjustment(&movement("no-such-product", 1, MovementReason::StockIn, "k"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::ForeignKeyViolation { .. } | DbError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_movements_page_by_keyset() {
        let (db, product) = setup().await;
        let inventory = db.inventory();

        let at = now();
        for i in 0..5 {
            let mut m = movement(&product.id, 1, MovementReason::StockIn, &format!("k{}", i));
            // Same timestamp for all rows: the id breaks the tie.
            m.created_at = at;
            inventory.append_adjustment(&m).await.unwrap();
        }

        let first = inventory.list_movements(BIZ, None, None, 2).await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(first[0].id > first[1].id);

        let last = first.last().unwrap();
        let cursor = Some((last.created_at, last.id.clone()));
        let second = inventory.list_movements(BIZ, None, cursor, 10).await.unwrap();
        assert_eq!(second.len(), 3);
        assert!(second.iter().all(|m| m.id < last.id));

        let scoped = inventory
            .list_movements(BIZ, Some("other-product"), None, 10)
            .await
            .unwrap();
        assert!(scoped.is_empty());
    }

    #[tokio::test]
    async fn test_low_stock_and_watermark() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let catalog = db.catalog();
        let inventory = db.inventory();

        let (empty_wm_products, empty_wm_movements) = inventory.watermark(BIZ).await.unwrap();
        assert!(empty_wm_products.is_none());
        assert!(empty_wm_movements.is_none());

        let low = catalog
            .insert_product(
                &NewProduct::new(BIZ, "Milk").reorder(Quantity::from_units(5).unwrap(), None),
            )
            .await
            .unwrap();
        let fine = catalog
            .insert_product(
                &NewProduct::new(BIZ, "Bread").reorder(Quantity::from_units(1).unwrap(), None),
            )
            .await
            .unwrap();
        inventory
            .append_adjustment(&movement(&low.id, 3, MovementReason::StockIn, "a"))
            .await
            .unwrap();
        inventory
            .append_adjustment(&movement(&fine.id, 9, MovementReason::StockIn, "b"))
            .await
            .unwrap();

        let products = inventory.list_low_stock(BIZ, 50).await.unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].id, low.id);

        let (products_at, movements_at) = inventory.watermark(BIZ).await.unwrap();
        assert!(products_at.is_some());
        assert!(movements_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_stock_out_never_goes_negative() {
        let path = std::env::temp_dir().join(format!("tally-ledger-{}.db", uuid::Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path).max_connections(8))
            .await
            .unwrap();
        let product = db
            .catalog()
            .insert_product(&NewProduct::new(BIZ, "Batteries"))
            .await
            .unwrap();
        db.inventory()
            .append_adjustment(&movement(&product.id, 10, MovementReason::StockIn, "open"))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..25 {
            let inventory = db.inventory();
            let m = movement(&product.id, -1, MovementReason::StockOut, &format!("out-{}", i));
            handles.push(tokio::spawn(async move { inventory.append_adjustment(&m).await }));
        }

        let mut applied = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                AppendOutcome::Applied { .. } => applied += 1,
                AppendOutcome::InsufficientStock { .. } => rejected += 1,
                AppendOutcome::DuplicateKey => panic!("keys are distinct"),
            }
        }

        assert_eq!(applied, 10);
        assert_eq!(rejected, 15);

        let stored = db.catalog().get_product(BIZ, &product.id).await.unwrap().unwrap();
        assert_eq!(stored.on_hand(), Quantity::ZERO);
        assert_eq!(db.inventory().ledger_total(BIZ, &product.id).await.unwrap(), Quantity::ZERO);

        db.close().await;
        let _ = std::fs::remove_file(&path);
    }
}
