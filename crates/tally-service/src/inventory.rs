//! # Inventory Service
//!
//! Stock adjustments and the inventory read models.
//!
//! ## Adjustment Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  adjust_stock(business, body, header key)                               │
//! │                                                                         │
//! │  1. key = body.idempotencyKey ∥ Idempotency-Key header                  │
//! │  2. movement with key exists? ──► replay { applied: false }             │
//! │  3. product (and store) exist for the business                          │
//! │  4. parse delta at the unit's scale, normalize sign by reason           │
//! │  5. ledger append (one transaction)                                     │
//! │       ├── Applied            ──► { applied: true }                      │
//! │       ├── DuplicateKey       ──► re-read, replay { applied: false }     │
//! │       └── InsufficientStock  ──► 409 INSUFFICIENT_STOCK                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{SubsecRound, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use tally_core::inventory::{
    is_low_stock, parse_adjustment_delta, resolve_adjustment_key, suggest_reorder_quantity,
    AdjustStockInput, AdjustStockResult, InventoryProductDetail, MovementView, MovementsPage,
    ReorderSuggestion, StockLevelView, Watermark,
};
use tally_core::validation::page_limit;
use tally_core::{format_timestamp, CoreError, InventoryMovement, Product};
use tally_db::{AppendOutcome, Database, NewMovement};

use crate::config::InventorySettings;
use crate::cursor::MovementCursor;
use crate::error::{ApiError, ServiceResult};

/// Stock adjustments plus the inventory dashboards.
#[derive(Debug, Clone)]
pub struct InventoryService {
    db: Database,
    settings: InventorySettings,
}

impl InventoryService {
    pub fn new(db: Database, settings: InventorySettings) -> Self {
        InventoryService { db, settings }
    }

    // -------------------------------------------------------------------------
    // Adjustments
    // -------------------------------------------------------------------------

    /// Records a manual stock movement.
    ///
    /// `header_key` is the request's `Idempotency-Key` header, used when the
    /// body carries no key.
    pub async fn adjust_stock(
        &self,
        business_id: &str,
        input: &AdjustStockInput,
        header_key: Option<&str>,
    ) -> ServiceResult<AdjustStockResult> {
        let key = resolve_adjustment_key(input.idempotency_key.as_deref(), header_key)?;

        let ledger = self.db.inventory();
        if let Some(existing) = ledger.find_by_key(business_id, &key).await? {
            debug!(key = %key, movement_id = %existing.id, "Replaying adjustment");
            return self.replay(business_id, &existing).await;
        }

        let product = self.require_product(business_id, &input.product_id).await?;
        if let Some(store_id) = &input.store_id {
            let store = self.db.catalog().get_store(business_id, store_id).await?;
            if store.is_none() {
                return Err(CoreError::StoreNotFound(store_id.clone()).into());
            }
        }

        let delta =
            parse_adjustment_delta(input.reason, &input.quantity_delta, product.quantity_scale())?;

        let movement = NewMovement {
            id: Uuid::new_v4().to_string(),
            business_id: business_id.to_string(),
            product_id: product.id.clone(),
            store_id: input.store_id.clone(),
            quantity_delta: delta,
            reason: input.reason,
            idempotency_key: key.clone(),
            related_sale_id: None,
            note: input.note.clone(),
            created_at: Utc::now().trunc_subsecs(6),
        };

        match ledger.append_adjustment(&movement).await? {
            AppendOutcome::Applied { movement, on_hand } => {
                info!(
                    product_id = %movement.product_id,
                    delta = %delta,
                    on_hand = %on_hand,
                    "Stock adjusted"
                );
                Ok(AdjustStockResult {
                    applied: true,
                    movement_id: movement.id,
                    on_hand_cached: on_hand.to_string(),
                    created_at: format_timestamp(&movement.created_at),
                })
            }
            AppendOutcome::DuplicateKey => {
                let existing = ledger
                    .find_by_key(business_id, &key)
                    .await?
                    .ok_or_else(|| ApiError::internal("Duplicate movement key without a row"))?;
                self.replay(business_id, &existing).await
            }
            AppendOutcome::InsufficientStock { on_hand } => {
                warn!(
                    product_id = %product.id,
                    on_hand = %on_hand,
                    delta = %delta,
                    "Adjustment rejected, stock would go negative"
                );
                Err(CoreError::InsufficientStock {
                    product_id: product.id,
                    on_hand: on_hand.to_string(),
                    quantity_delta: delta.to_string(),
                }
                .into())
            }
        }
    }

    /// The result the original call returned. Rows written before
    /// `on_hand_after` existed fall back to the live counter.
    async fn replay(
        &self,
        business_id: &str,
        movement: &InventoryMovement,
    ) -> ServiceResult<AdjustStockResult> {
        let on_hand = match movement.on_hand_after() {
            Some(on_hand) => on_hand,
            None => {
                self.require_product(business_id, &movement.product_id)
                    .await?
                    .on_hand()
            }
        };
        Ok(AdjustStockResult {
            applied: false,
            movement_id: movement.id.clone(),
            on_hand_cached: on_hand.to_string(),
            created_at: format_timestamp(&movement.created_at),
        })
    }

    async fn require_product(&self, business_id: &str, product_id: &str) -> ServiceResult<Product> {
        self.db
            .catalog()
            .get_product(business_id, product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()).into())
    }

    // -------------------------------------------------------------------------
    // Read models
    // -------------------------------------------------------------------------

    /// Newest-first movements, optionally for one product.
    pub async fn list_movements_page(
        &self,
        business_id: &str,
        product_id: Option<&str>,
        cursor: Option<&str>,
        limit: Option<i64>,
    ) -> ServiceResult<MovementsPage> {
        let limit = page_limit(
            limit,
            self.settings.movements_page_default,
            self.settings.movements_page_max,
        )
        .map_err(CoreError::from)?;
        let after = cursor.map(MovementCursor::decode).transpose()?;

        let mut rows = self
            .db
            .inventory()
            .list_movements(
                business_id,
                product_id,
                after.map(|c| (c.created_at, c.id)),
                limit + 1,
            )
            .await?;

        let has_more = rows.len() as i64 > limit;
        rows.truncate(limit as usize);
        let next_cursor = if has_more {
            rows.last().map(|m| MovementCursor::after(m).encode())
        } else {
            None
        };

        Ok(MovementsPage {
            items: rows.iter().map(MovementView::from).collect(),
            next_cursor,
        })
    }

    /// Tracked products at or below their reorder point.
    pub async fn list_low_stock(
        &self,
        business_id: &str,
        limit: Option<i64>,
    ) -> ServiceResult<Vec<StockLevelView>> {
        let products = self.low_stock_products(business_id, limit).await?;
        Ok(products.iter().map(StockLevelView::from).collect())
    }

    pub async fn list_reorder_suggestions(
        &self,
        business_id: &str,
        limit: Option<i64>,
    ) -> ServiceResult<Vec<ReorderSuggestion>> {
        let products = self.low_stock_products(business_id, limit).await?;
        Ok(products
            .iter()
            .filter_map(|p| {
                suggest_reorder_quantity(p).map(|qty| ReorderSuggestion {
                    product: StockLevelView::from(p),
                    suggested_quantity: qty.to_string(),
                })
            })
            .collect())
    }

    async fn low_stock_products(
        &self,
        business_id: &str,
        limit: Option<i64>,
    ) -> ServiceResult<Vec<Product>> {
        let limit = page_limit(limit, self.settings.low_stock_limit, self.settings.low_stock_limit)
            .map_err(CoreError::from)?;
        Ok(self.db.inventory().list_low_stock(business_id, limit).await?)
    }

    pub async fn get_watermark(&self, business_id: &str) -> ServiceResult<Watermark> {
        let (products, movements) = self.db.inventory().watermark(business_id).await?;
        Ok(Watermark::new(products, movements))
    }

    pub async fn get_inventory_product_detail(
        &self,
        business_id: &str,
        product_id: &str,
    ) -> ServiceResult<InventoryProductDetail> {
        let product = self.require_product(business_id, product_id).await?;
        let recent = self
            .db
            .inventory()
            .list_movements(
                business_id,
                Some(product_id),
                None,
                self.settings.recent_movements,
            )
            .await?;

        Ok(InventoryProductDetail {
            is_low_stock: is_low_stock(&product),
            product: StockLevelView::from(&product),
            recent_movements: recent.iter().map(MovementView::from).collect(),
        })
    }
}
