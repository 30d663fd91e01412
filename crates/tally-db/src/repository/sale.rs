//! # Sale Repository
//!
//! Writes a checkout's sale tree in one transaction and reads it back.
//!
//! ## Commit
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       One Transaction                                   │
//! │                                                                         │
//! │  1. INSERT sales            ← write lock taken here                    │
//! │     └── UNIQUE(business, key) → ROLLBACK, DuplicateKey                 │
//! │                                                                         │
//! │  2. INSERT sale_line_items (+ sale_line_item_modifiers)                │
//! │     INSERT sale_payments                                               │
//! │     INSERT sale_discounts                                              │
//! │                                                                         │
//! │  3. Per tracked product:                                               │
//! │     └── conditional decrement of on_hand_cached                        │
//! │         └── refused → ROLLBACK, OutOfStock                             │
//! │     └── INSERT SALE movement (key = sha256(checkout key:product))      │
//! │         └── key taken → ROLLBACK, IdempotencyKeyConflict               │
//! │                                                                         │
//! │  4. COMMIT                                                             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A sale is never updated after commit.

use serde::de::DeserializeOwned;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::repository::inventory::{
    apply_delta, current_on_hand, insert_movement, NewMovement, MOVEMENT_SELECT,
};
use crate::repository::new_id;
use tally_core::checkout::{LineDraft, SaleDraft};
use tally_core::error::CoreError;
use tally_core::types::format_timestamp;
use tally_core::{
    InventoryMovement, MovementReason, Quantity, SaleDiscountRecord, SaleLineItemRecord,
    SaleLineModifierRecord, SaleLineWithModifiers, SalePaymentRecord, SaleRecord, SaleStatus,
    SaleWithDetails,
};

/// What happened to a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed { sale_id: String },
    /// A sale with this `(business, key)` already exists. Nothing was
    /// written.
    DuplicateKey,
    /// Stock moved since the pre-check and this product can no longer cover
    /// the sale. Nothing was written.
    OutOfStock {
        product_id: String,
        product_name: String,
        requested: Quantity,
        on_hand: Quantity,
    },
}

/// Repository for sales.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Commits a sale draft with its stock movements.
    pub async fn commit(&self, draft: &SaleDraft) -> DbResult<CommitOutcome> {
        let header = &draft.header;
        let mut tx = self.pool.begin().await?;

        if !insert_sale(&mut *tx, draft).await? {
            tx.rollback().await?;
            warn!(key = %header.idempotency_key, "Sale key already used, reporting duplicate");
            return Ok(CommitOutcome::DuplicateKey);
        }

        for (position, line) in draft.lines.iter().enumerate() {
            insert_line(&mut *tx, &header.id, position as i64, line).await?;
        }

        for (position, payment) in draft.payments.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO sale_payments (id, sale_id, position, method, amount_minor)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(new_id())
            .bind(&header.id)
            .bind(position as i64)
            .bind(payment.method)
            .bind(payment.amount_minor)
            .execute(&mut *tx)
            .await?;
        }

        for (position, discount) in draft.discounts.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO sale_discounts (
                    id, sale_id, position, discount_id, scope, name_snapshot,
                    type_snapshot, value_snapshot_minor, amount_applied_minor
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(new_id())
            .bind(&header.id)
            .bind(position as i64)
            .bind(&discount.discount_id)
            .bind(discount.scope)
            .bind(&discount.name_snapshot)
            .bind(discount.type_snapshot)
            .bind(discount.value_snapshot_minor)
            .bind(discount.amount_applied_minor)
            .execute(&mut *tx)
            .await?;
        }

        for movement in &draft.movements {
            let updated = apply_delta(
                &mut *tx,
                &header.business_id,
                &movement.product_id,
                movement.quantity_delta,
                &header.created_at,
            )
            .await?;

            let Some(on_hand_after) = updated else {
                let current = current_on_hand(&mut *tx, &header.business_id, &movement.product_id).await?;
                tx.rollback().await?;
                let Some(on_hand) = current else {
                    return Err(DbError::not_found("Product", movement.product_id.clone()));
                };
                warn!(
                    sale_id = %header.id,
                    product_id = %movement.product_id,
                    on_hand = %on_hand,
                    requested = %movement.requested,
                    "Sale rolled back, stock changed since pre-check"
                );
                return Ok(CommitOutcome::OutOfStock {
                    product_id: movement.product_id.clone(),
                    product_name: movement.product_name.clone(),
                    requested: movement.requested,
                    on_hand,
                });
            };

            let row = NewMovement {
                id: new_id(),
                business_id: header.business_id.clone(),
                product_id: movement.product_id.clone(),
                store_id: None,
                quantity_delta: movement.quantity_delta,
                reason: MovementReason::Sale,
                idempotency_key: movement.idempotency_key.clone(),
                related_sale_id: Some(header.id.clone()),
                note: None,
                created_at: header.created_at,
            };
            if !insert_movement(&mut *tx, &row, Some(on_hand_after)).await? {
                tx.rollback().await?;
                warn!(
                    sale_id = %header.id,
                    key = %movement.idempotency_key,
                    "Sale rolled back, movement key already taken"
                );
                return Err(DbError::Domain(CoreError::IdempotencyKeyConflict(
                    movement.idempotency_key.clone(),
                )));
            }
        }

        tx.commit().await?;

        info!(
            sale_id = %header.id,
            key = %header.idempotency_key,
            lines = draft.lines.len(),
            movements = draft.movements.len(),
            total_minor = draft.total_minor,
            "Sale committed"
        );

        Ok(CommitOutcome::Committed {
            sale_id: header.id.clone(),
        })
    }

    /// Reads a committed sale by its checkout key.
    pub async fn find_by_key(
        &self,
        business_id: &str,
        idempotency_key: &str,
    ) -> DbResult<Option<SaleWithDetails>> {
        let sale_id: Option<String> = sqlx::query_scalar(
            "SELECT id FROM sales WHERE business_id = ?1 AND idempotency_key = ?2",
        )
        .bind(business_id)
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await?;

        match sale_id {
            Some(id) => self.get_sale(business_id, &id).await,
            None => Ok(None),
        }
    }

    /// Reads a committed sale with every child row, in position order.
    pub async fn get_sale(&self, business_id: &str, id: &str) -> DbResult<Option<SaleWithDetails>> {
        let sale = sqlx::query_as::<_, SaleRecord>(
            r#"
            SELECT id, business_id, idempotency_key, status, user_id, device_id,
                   subtotal_minor, discount_total_minor, tax_total_minor, total_minor,
                   created_at
            FROM sales
            WHERE id = ?1 AND business_id = ?2
            "#,
        )
        .bind(id)
        .bind(business_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(sale) = sale else {
            return Ok(None);
        };

        let lines = sqlx::query_as::<_, SaleLineItemRecord>(
            r#"
            SELECT id, sale_id, position, product_id, product_name, quantity_scaled,
                   quantity_legacy_int, base_unit_price_minor, unit_price_minor,
                   total_modifiers_delta_minor, line_total_minor,
                   selected_modifier_option_ids, selected_attributes
            FROM sale_line_items
            WHERE sale_id = ?1
            ORDER BY position
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let modifiers = sqlx::query_as::<_, SaleLineModifierRecord>(
            r#"
            SELECT m.id, m.line_item_id, m.modifier_option_id, m.modifier_group_id,
                   m.option_name, m.group_name, m.price_delta_minor
            FROM sale_line_item_modifiers m
            INNER JOIN sale_line_items l ON l.id = m.line_item_id
            WHERE l.sale_id = ?1
            ORDER BY l.position, m.position
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let payments = sqlx::query_as::<_, SalePaymentRecord>(
            r#"
            SELECT id, sale_id, position, method, amount_minor
            FROM sale_payments
            WHERE sale_id = ?1
            ORDER BY position
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let discounts = sqlx::query_as::<_, SaleDiscountRecord>(
            r#"
            SELECT id, sale_id, position, discount_id, scope, name_snapshot,
                   type_snapshot, value_snapshot_minor, amount_applied_minor
            FROM sale_discounts
            WHERE sale_id = ?1
            ORDER BY position
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let sql = format!("{MOVEMENT_SELECT} WHERE related_sale_id = ?1 ORDER BY product_id");
        let movements = sqlx::query_as::<_, InventoryMovement>(&sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await?;

        let mut modifiers = modifiers.into_iter().peekable();
        let lines = lines
            .into_iter()
            .map(|line| {
                let mut own = Vec::new();
                while let Some(m) = modifiers.next_if(|m| m.line_item_id == line.id) {
                    own.push(m);
                }
                Ok(SaleLineWithModifiers {
                    selected_modifier_option_ids: decode_json_column(
                        &line.id,
                        "selected_modifier_option_ids",
                        &line.selected_modifier_option_ids,
                    )?,
                    selected_attributes: decode_json_column(
                        &line.id,
                        "selected_attributes",
                        &line.selected_attributes,
                    )?,
                    line,
                    modifiers: own,
                })
            })
            .collect::<DbResult<Vec<_>>>()?;

        debug!(sale_id = %id, "Loaded sale");

        Ok(Some(SaleWithDetails {
            sale,
            lines,
            payments,
            discounts,
            movements,
        }))
    }
}

/// Inserts the sale header. Returns `false` if the key is already used.
async fn insert_sale(conn: &mut SqliteConnection, draft: &SaleDraft) -> DbResult<bool> {
    let header = &draft.header;
    let result = sqlx::query(
        r#"
        INSERT INTO sales (
            id, business_id, idempotency_key, status, user_id, device_id,
            subtotal_minor, discount_total_minor, tax_total_minor, total_minor,
            created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&header.id)
    .bind(&header.business_id)
    .bind(&header.idempotency_key)
    .bind(SaleStatus::Completed)
    .bind(&header.user_id)
    .bind(&header.device_id)
    .bind(draft.subtotal_minor)
    .bind(draft.discount_total_minor)
    .bind(draft.tax_total_minor)
    .bind(draft.total_minor)
    .bind(format_timestamp(&header.created_at))
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

async fn insert_line(
    conn: &mut SqliteConnection,
    sale_id: &str,
    position: i64,
    line: &LineDraft,
) -> DbResult<()> {
    let line_id = new_id();
    let option_ids = serde_json::to_string(&line.selected_modifier_option_ids())?;
    let attributes = serde_json::to_string(&line.attributes)?;

    sqlx::query(
        r#"
        INSERT INTO sale_line_items (
            id, sale_id, position, product_id, product_name, quantity_scaled,
            quantity_legacy_int, base_unit_price_minor, unit_price_minor,
            total_modifiers_delta_minor, line_total_minor,
            selected_modifier_option_ids, selected_attributes
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        "#,
    )
    .bind(&line_id)
    .bind(sale_id)
    .bind(position)
    .bind(&line.product_id)
    .bind(&line.product_name)
    .bind(line.quantity.scaled())
    .bind(line.quantity_legacy_int)
    .bind(line.base_unit_price_minor)
    .bind(line.unit_price_minor)
    .bind(line.total_modifiers_delta_minor)
    .bind(line.line_total_minor)
    .bind(option_ids)
    .bind(attributes)
    .execute(&mut *conn)
    .await?;

    for (position, modifier) in line.modifiers.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO sale_line_item_modifiers (
                id, line_item_id, position, modifier_option_id, modifier_group_id,
                option_name, group_name, price_delta_minor
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(new_id())
        .bind(&line_id)
        .bind(position as i64)
        .bind(&modifier.option_id)
        .bind(&modifier.group_id)
        .bind(&modifier.option_name)
        .bind(&modifier.group_name)
        .bind(modifier.price_delta_minor)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Decodes a JSON snapshot column of a sale line. A corrupt row is an error,
/// never an empty selection.
fn decode_json_column<T: DeserializeOwned>(line_id: &str, column: &str, raw: &str) -> DbResult<T> {
    serde_json::from_str(raw)
        .map_err(|e| DbError::Decode(format!("sale_line_items.{} of {}: {}", column, line_id, e)))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::catalog::NewProduct;
    use crate::repository::inventory::AppendOutcome;
    use crate::repository::now;
    use tally_core::checkout::{
        derive_movement_key, price_line, CartLineInput, PaymentInput, SaleHeader,
    };
    use tally_core::modifiers::{ModifierGroupState, ModifierOptionState};
    use tally_core::{PaymentMethod, Product, DEFAULT_BUSINESS_ID as BIZ};

    async fn stock(db: &Database, product: &Product, units: i64, key: &str) {
        let outcome = db
            .inventory()
            .append_adjustment(&NewMovement {
                id: new_id(),
                business_id: BIZ.to_string(),
                product_id: product.id.clone(),
                store_id: None,
                quantity_delta: Quantity::from_units(units).unwrap(),
                reason: MovementReason::StockIn,
                idempotency_key: key.to_string(),
                related_sale_id: None,
                note: None,
                created_at: now(),
            })
            .await
            .unwrap();
        assert!(matches!(outcome, AppendOutcome::Applied { .. }));
    }

    fn header(key: &str) -> SaleHeader {
        SaleHeader {
            id: new_id(),
            business_id: BIZ.to_string(),
            user_id: "cashier-1".to_string(),
            device_id: None,
            idempotency_key: key.to_string(),
            created_at: now(),
        }
    }

    fn cash(minor: &str) -> PaymentInput {
        PaymentInput {
            method: PaymentMethod::Cash,
            amount_minor: Some(minor.to_string()),
            amount: None,
        }
    }

    fn draft(product: &Product, qty: &str, key: &str, paid: &str) -> SaleDraft {
        let line = CartLineInput {
            product_id: product.id.clone(),
            quantity: qty.to_string(),
            ..Default::default()
        };
        let priced = price_line(product, &line, &[], &[]).unwrap();
        SaleDraft::build(header(key), vec![priced], &[], &[cash(paid)]).unwrap()
    }

    #[tokio::test]
    async fn test_commit_writes_tree_and_decrements() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .catalog()
            .insert_product(&NewProduct::new(BIZ, "Notebook").price_minor(500))
            .await
            .unwrap();
        stock(&db, &product, 10, "open").await;
        let product = db.catalog().get_product(BIZ, &product.id).await.unwrap().unwrap();

        let draft = draft(&product, "3", "k1", "1500");
        let outcome = db.sales().commit(&draft).await.unwrap();
        assert_eq!(
            outcome,
            CommitOutcome::Committed {
                sale_id: draft.header.id.clone()
            }
        );

        let sale = db.sales().find_by_key(BIZ, "k1").await.unwrap().unwrap();
        assert_eq!(sale.sale.total_minor, 1500);
        assert_eq!(sale.lines.len(), 1);
        assert_eq!(sale.lines[0].line.quantity_legacy_int, 3);
        assert_eq!(sale.lines[0].line.selected_attributes, "[]");
        assert!(sale.lines[0].selected_attributes.is_empty());
        assert_eq!(sale.payments.len(), 1);
        assert_eq!(sale.movements.len(), 1);
        assert_eq!(sale.movements[0].reason, MovementReason::Sale);
        assert_eq!(sale.movements[0].delta(), Quantity::from_units(-3).unwrap());
        assert_eq!(
            sale.movements[0].on_hand_after(),
            Some(Quantity::from_units(7).unwrap())
        );

        let product = db.catalog().get_product(BIZ, &product.id).await.unwrap().unwrap();
        assert_eq!(product.on_hand(), Quantity::from_units(7).unwrap());
        assert_eq!(
            db.inventory().ledger_total(BIZ, &product.id).await.unwrap(),
            product.on_hand()
        );
    }

    #[tokio::test]
    async fn test_second_commit_with_same_key_is_duplicate() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .catalog()
            .insert_product(&NewProduct::new(BIZ, "Pencil").price_minor(100))
            .await
            .unwrap();
        stock(&db, &product, 10, "open").await;
        let product = db.catalog().get_product(BIZ, &product.id).await.unwrap().unwrap();

        let first = draft(&product, "1", "same", "100");
        let second = draft(&product, "1", "same", "100");
        db.sales().commit(&first).await.unwrap();
        let outcome = db.sales().commit(&second).await.unwrap();

        assert_eq!(outcome, CommitOutcome::DuplicateKey);
        assert!(db.sales().get_sale(BIZ, &second.header.id).await.unwrap().is_none());
        let product = db.catalog().get_product(BIZ, &product.id).await.unwrap().unwrap();
        assert_eq!(product.on_hand(), Quantity::from_units(9).unwrap());
    }

    #[tokio::test]
    async fn test_taken_movement_key_is_a_typed_conflict() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .catalog()
            .insert_product(&NewProduct::new(BIZ, "Mug").price_minor(800))
            .await
            .unwrap();
        stock(&db, &product, 5, "open").await;
        // A manual adjustment that happens to reuse the key the sale derives.
        stock(&db, &product, 1, &derive_movement_key("clash", &product.id)).await;
        let product = db.catalog().get_product(BIZ, &product.id).await.unwrap().unwrap();

        let draft = draft(&product, "2", "clash", "1600");
        let err = db.sales().commit(&draft).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::IdempotencyKeyConflict(_))
        ));

        assert!(db.sales().find_by_key(BIZ, "clash").await.unwrap().is_none());
        let product = db.catalog().get_product(BIZ, &product.id).await.unwrap().unwrap();
        assert_eq!(product.on_hand(), Quantity::from_units(6).unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_column_is_a_decode_error() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .catalog()
            .insert_product(&NewProduct::new(BIZ, "Bowl").price_minor(700))
            .await
            .unwrap();
        stock(&db, &product, 2, "open").await;
        let product = db.catalog().get_product(BIZ, &product.id).await.unwrap().unwrap();

        let draft = draft(&product, "1", "corrupt", "700");
        db.sales().commit(&draft).await.unwrap();
        sqlx::query("UPDATE sale_line_items SET selected_attributes = '{oops' WHERE sale_id = ?1")
            .bind(&draft.header.id)
            .execute(db.pool())
            .await
            .unwrap();

        let err = db.sales().find_by_key(BIZ, "corrupt").await.unwrap_err();
        assert!(matches!(err, DbError::Decode(_)));
    }

    #[tokio::test]
    async fn test_stale_precheck_rolls_back_everything() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .catalog()
            .insert_product(&NewProduct::new(BIZ, "Lamp").price_minor(2000))
            .await
            .unwrap();
        stock(&db, &product, 5, "open").await;

        // Priced while 5 were on hand.
        let snapshot = db.catalog().get_product(BIZ, &product.id).await.unwrap().unwrap();
        let draft = draft(&snapshot, "4", "late", "8000");

        // Someone else takes 3 before the commit.
        db.inventory()
            .append_adjustment(&NewMovement {
                id: new_id(),
                business_id: BIZ.to_string(),
                product_id: product.id.clone(),
                store_id: None,
                quantity_delta: Quantity::from_units(-3).unwrap(),
                reason: MovementReason::StockOut,
                idempotency_key: "taken".to_string(),
                related_sale_id: None,
                note: None,
                created_at: now(),
            })
            .await
            .unwrap();

        let outcome = db.sales().commit(&draft).await.unwrap();
        match outcome {
            CommitOutcome::OutOfStock {
                on_hand, requested, ..
            } => {
                assert_eq!(on_hand, Quantity::from_units(2).unwrap());
                assert_eq!(requested, Quantity::from_units(4).unwrap());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(db.sales().find_by_key(BIZ, "late").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_modifier_rows_read_back_in_order() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .catalog()
            .insert_product(&NewProduct::new(BIZ, "Latte").price_minor(400).untracked())
            .await
            .unwrap();

        let groups = vec![ModifierGroupState {
            group_id: "g1".to_string(),
            group_name: "Extras".to_string(),
            min_selected: 0,
            max_selected: None,
            options: vec![
                ModifierOptionState {
                    id: "shot".to_string(),
                    group_id: "g1".to_string(),
                    name: "Extra shot".to_string(),
                    price_delta_minor: 100,
                    is_active: true,
                },
                ModifierOptionState {
                    id: "syrup".to_string(),
                    group_id: "g1".to_string(),
                    name: "Syrup".to_string(),
                    price_delta_minor: 50,
                    is_active: true,
                },
            ],
        }];
        let line = CartLineInput {
            product_id: product.id.clone(),
            quantity: "2".to_string(),
            selected_modifier_option_ids: vec!["syrup".to_string(), "shot".to_string()],
            ..Default::default()
        };
        let priced = price_line(&product, &line, &[], &groups).unwrap();
        let draft = SaleDraft::build(header("mods"), vec![priced], &[], &[cash("1100")]).unwrap();
        db.sales().commit(&draft).await.unwrap();

        let sale = db.sales().find_by_key(BIZ, "mods").await.unwrap().unwrap();
        let line = &sale.lines[0];
        assert_eq!(line.line.unit_price_minor, 550);
        assert_eq!(line.line.line_total_minor, 1100);
        assert_eq!(line.line.selected_modifier_option_ids, r#"["syrup","shot"]"#);
        assert_eq!(line.modifiers.len(), 2);
        assert_eq!(line.modifiers[0].modifier_option_id, "syrup");
        assert_eq!(line.modifiers[1].modifier_option_id, "shot");
        // Untracked: no stock movement.
        assert!(sale.movements.is_empty());
    }
}
