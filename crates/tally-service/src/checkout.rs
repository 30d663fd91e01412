//! # Checkout Service
//!
//! Turns a cart into a committed sale, exactly once per idempotency key.
//!
//! ## Checkout Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    checkout(business, user, input)                      │
//! │                                                                         │
//! │  1. key required ───────────────────────────► IDEMPOTENCY_KEY_REQUIRED  │
//! │  2. sale with key exists? ──────────────────► replay committed result   │
//! │  3. cart non-empty ─────────────────────────► CART_EMPTY                │
//! │  4. device active for business ─────────────► DEVICE_NOT_FOUND          │
//! │  5. per line: product, price, attributes, modifiers                     │
//! │  6. discounts live and unique ──────────────► DISCOUNT_NOT_FOUND        │
//! │  7. SaleDraft::build                                                    │
//! │       stock pre-check, discounts, payments                              │
//! │  ─────────────────── nothing written above this line ────────────────── │
//! │  8. SaleRepository::commit (one transaction)                            │
//! │       ├── Committed   ──► read back, shape result                       │
//! │       ├── DuplicateKey ─► concurrent twin won: return its sale          │
//! │       └── OutOfStock  ──► 409, nothing written                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{SubsecRound, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use tally_core::checkout::{
    price_line, CheckoutInput, CheckoutResult, DiscountRef, LineDraft, SaleDraft, SaleHeader,
    StockRequirement,
};
use tally_core::discount::dedupe_discount_ids;
use tally_core::{CoreError, Discount};
use tally_db::{CommitOutcome, Database};

use crate::error::{ApiError, ServiceResult};

/// Entry point for the checkout endpoint.
#[derive(Debug, Clone)]
pub struct CheckoutService {
    db: Database,
}

impl CheckoutService {
    pub fn new(db: Database) -> Self {
        CheckoutService { db }
    }

    /// Validates, prices and commits a cart.
    ///
    /// Replaying a key returns the sale committed under it, even if the
    /// catalog or stock has changed since.
    pub async fn checkout(
        &self,
        business_id: &str,
        user_id: &str,
        input: &CheckoutInput,
    ) -> ServiceResult<CheckoutResult> {
        let key = input.require_key()?.to_string();

        let sales = self.db.sales();
        if let Some(existing) = sales.find_by_key(business_id, &key).await? {
            debug!(key = %key, sale_id = %existing.sale.id, "Replaying checkout");
            return Ok(CheckoutResult::from_record(&existing));
        }

        input.check_cart()?;
        let device_id = self
            .resolve_device(business_id, input.device_id.as_deref())
            .await?;
        let lines = self.price_lines(business_id, input).await?;
        let discounts = self.resolve_discounts(business_id, &input.discounts).await?;

        let header = SaleHeader {
            id: Uuid::new_v4().to_string(),
            business_id: business_id.to_string(),
            user_id: user_id.to_string(),
            device_id,
            idempotency_key: key.clone(),
            created_at: Utc::now().trunc_subsecs(6),
        };
        let draft = SaleDraft::build(header, lines, &discounts, &input.payments)?;

        match sales.commit(&draft).await? {
            CommitOutcome::Committed { sale_id } => {
                info!(
                    sale_id = %sale_id,
                    total_minor = draft.total_minor,
                    lines = draft.lines.len(),
                    "Checkout committed"
                );
                let record = sales
                    .get_sale(business_id, &sale_id)
                    .await?
                    .ok_or_else(|| ApiError::internal("Committed sale could not be read back"))?;
                Ok(CheckoutResult::from_record(&record))
            }
            CommitOutcome::DuplicateKey => {
                warn!(key = %key, "Checkout lost an idempotency race, returning the winner");
                let record = sales
                    .find_by_key(business_id, &key)
                    .await?
                    .ok_or_else(|| ApiError::internal("Duplicate sale key without a row"))?;
                Ok(CheckoutResult::from_record(&record))
            }
            CommitOutcome::OutOfStock {
                product_id,
                product_name,
                requested,
                on_hand,
            } => {
                warn!(
                    product_id = %product_id,
                    requested = %requested,
                    on_hand = %on_hand,
                    "Checkout rejected at commit, stock moved since pricing"
                );
                let requirement = StockRequirement {
                    product_id,
                    product_name,
                    track_inventory: true,
                    on_hand,
                    requested,
                };
                Err(requirement.out_of_stock(on_hand).into())
            }
        }
    }

    async fn resolve_device(
        &self,
        business_id: &str,
        device_id: Option<&str>,
    ) -> ServiceResult<Option<String>> {
        let Some(device_id) = device_id else {
            return Ok(None);
        };
        match self.db.catalog().get_device(business_id, device_id).await? {
            Some(device) if device.is_active => Ok(Some(device.id)),
            _ => Err(CoreError::DeviceNotFound(device_id.to_string()).into()),
        }
    }

    async fn price_lines(
        &self,
        business_id: &str,
        input: &CheckoutInput,
    ) -> ServiceResult<Vec<LineDraft>> {
        let catalog = self.db.catalog();
        let mut lines = Vec::with_capacity(input.cart.len());

        for line in &input.cart {
            let product = catalog
                .get_product(business_id, &line.product_id)
                .await?
                .ok_or_else(|| CoreError::ProductNotFound(line.product_id.clone()))?;
            let links = catalog.product_attribute_links(business_id, &product.id).await?;
            let groups = catalog.product_modifier_groups(business_id, &product.id).await?;

            lines.push(price_line(&product, line, &links, &groups)?);
        }
        Ok(lines)
    }

    /// Loads each referenced discount once, in first-seen order.
    async fn resolve_discounts(
        &self,
        business_id: &str,
        refs: &[DiscountRef],
    ) -> ServiceResult<Vec<Discount>> {
        let catalog = self.db.catalog();
        let mut discounts = Vec::new();

        for id in dedupe_discount_ids(refs.iter().map(|r| r.discount_id.as_str())) {
            match catalog.get_discount(business_id, &id).await? {
                Some(d) if d.is_active && !d.is_archived => discounts.push(d),
                _ => return Err(CoreError::DiscountNotFound(id).into()),
            }
        }
        Ok(discounts)
    }
}
