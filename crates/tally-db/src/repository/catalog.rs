//! # Catalog Repository
//!
//! Reads of the live catalog that checkout and the inventory projections
//! depend on, plus the small set of writes used to seed a business.
//!
//! ## What Checkout Reads
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Per Cart Line                                        │
//! │                                                                         │
//! │  get_product(business, id)            name, price, scale, on_hand      │
//! │       │                                                                 │
//! │       ├── product_attribute_links()   links + every option (archived   │
//! │       │                               too, so the validator can say    │
//! │       │                               why a selection is rejected)     │
//! │       │                                                                 │
//! │       └── product_modifier_groups()   active, unarchived groups and    │
//! │                                       all of their options             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A product's precision scale lives on its unit. Products without a unit
//! are whole-number products (scale 0).

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::{new_id, now};
use tally_core::attributes::{AttributeOptionState, ProductAttributeLink};
use tally_core::modifiers::{ModifierGroupState, ModifierOptionState};
use tally_core::types::format_timestamp;
use tally_core::{
    CoreError, Device, Discount, DiscountScope, DiscountType, Product, Quantity, SelectionType,
    Store, Unit,
};

/// Product columns with the unit's scale folded in. Callers append the
/// `WHERE` clause.
pub(crate) const PRODUCT_SELECT: &str = r#"
    SELECT
        p.id,
        p.business_id,
        p.name,
        p.sku,
        p.unit_id,
        COALESCE(u.precision_scale, 0) AS precision_scale,
        p.price_minor,
        p.track_inventory,
        p.on_hand_cached,
        p.reorder_point,
        p.reorder_quantity,
        p.is_active,
        p.created_at,
        p.updated_at
    FROM products p
    LEFT JOIN units u ON u.id = p.unit_id
"#;

// =============================================================================
// Inputs
// =============================================================================

/// A product to create. Stock always starts at zero; opening stock is
/// recorded as a `STOCK_IN` movement so the ledger explains the counter.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub business_id: String,
    pub name: String,
    pub sku: Option<String>,
    pub unit_id: Option<String>,
    pub price_minor: Option<i64>,
    pub track_inventory: bool,
    pub reorder_point: Option<Quantity>,
    pub reorder_quantity: Option<Quantity>,
}

impl NewProduct {
    pub fn new(business_id: impl Into<String>, name: impl Into<String>) -> Self {
        NewProduct {
            business_id: business_id.into(),
            name: name.into(),
            sku: None,
            unit_id: None,
            price_minor: None,
            track_inventory: true,
            reorder_point: None,
            reorder_quantity: None,
        }
    }

    pub fn sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = Some(sku.into());
        self
    }

    pub fn unit(mut self, unit_id: impl Into<String>) -> Self {
        self.unit_id = Some(unit_id.into());
        self
    }

    pub fn price_minor(mut self, price_minor: i64) -> Self {
        self.price_minor = Some(price_minor);
        self
    }

    pub fn untracked(mut self) -> Self {
        self.track_inventory = false;
        self
    }

    pub fn reorder(mut self, point: Quantity, quantity: Option<Quantity>) -> Self {
        self.reorder_point = Some(point);
        self.reorder_quantity = quantity;
        self
    }
}

#[derive(Debug, Clone)]
pub struct NewDiscount {
    pub business_id: String,
    pub name: String,
    pub discount_type: DiscountType,
    pub scope: DiscountScope,
    /// Basis points for `PERCENT`, minor units for `FIXED`.
    pub value_minor: i64,
    pub product_id: Option<String>,
}

// =============================================================================
// Row shapes that are not domain types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct AttributeLinkRow {
    attribute_id: String,
    attribute_name: String,
    selection_type: SelectionType,
    is_required: bool,
    is_archived: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct ModifierGroupRow {
    group_id: String,
    group_name: String,
    min_selected: i64,
    max_selected: Option<i64>,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for catalog reads and seed writes.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Gets a product scoped to a business. Inactive products are returned;
    /// the caller decides whether that matters.
    pub async fn get_product(&self, business_id: &str, id: &str) -> DbResult<Option<Product>> {
        let sql = format!("{PRODUCT_SELECT} WHERE p.id = ?1 AND p.business_id = ?2");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .bind(business_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    pub async fn get_unit(&self, business_id: &str, id: &str) -> DbResult<Option<Unit>> {
        let unit = sqlx::query_as::<_, Unit>(
            "SELECT id, business_id, name, precision_scale FROM units WHERE id = ?1 AND business_id = ?2",
        )
        .bind(id)
        .bind(business_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(unit)
    }

    pub async fn get_device(&self, business_id: &str, id: &str) -> DbResult<Option<Device>> {
        let device = sqlx::query_as::<_, Device>(
            r#"
            SELECT id, business_id, name, is_active, created_at
            FROM devices
            WHERE id = ?1 AND business_id = ?2
            "#,
        )
        .bind(id)
        .bind(business_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(device)
    }

    pub async fn get_store(&self, business_id: &str, id: &str) -> DbResult<Option<Store>> {
        let store = sqlx::query_as::<_, Store>(
            r#"
            SELECT id, business_id, name, is_active, created_at
            FROM stores
            WHERE id = ?1 AND business_id = ?2
            "#,
        )
        .bind(id)
        .bind(business_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(store)
    }

    pub async fn get_discount(&self, business_id: &str, id: &str) -> DbResult<Option<Discount>> {
        let discount = sqlx::query_as::<_, Discount>(
            r#"
            SELECT id, business_id, name, discount_type, scope, value_minor,
                   product_id, is_active, is_archived
            FROM discounts
            WHERE id = ?1 AND business_id = ?2
            "#,
        )
        .bind(id)
        .bind(business_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(discount)
    }

    /// Attribute links for a product, in link order, each with all of its
    /// options (archived ones included).
    ///
    /// `is_required` is the per-product override when set, otherwise the
    /// attribute's own flag.
    pub async fn product_attribute_links(
        &self,
        business_id: &str,
        product_id: &str,
    ) -> DbResult<Vec<ProductAttributeLink>> {
        let rows = sqlx::query_as::<_, AttributeLinkRow>(
            r#"
            SELECT
                a.id AS attribute_id,
                a.name AS attribute_name,
                a.selection_type,
                COALESCE(pa.is_required_override, a.is_required) AS is_required,
                a.is_archived
            FROM product_attributes pa
            INNER JOIN attributes a ON a.id = pa.attribute_id
            WHERE pa.product_id = ?1 AND a.business_id = ?2
            ORDER BY pa.sort_order, a.name
            "#,
        )
        .bind(product_id)
        .bind(business_id)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let options = sqlx::query_as::<_, AttributeOptionState>(
            r#"
            SELECT o.id, o.attribute_id, o.name, o.is_archived
            FROM attribute_options o
            INNER JOIN product_attributes pa ON pa.attribute_id = o.attribute_id
            WHERE pa.product_id = ?1
            ORDER BY o.sort_order, o.name
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        let mut links: Vec<ProductAttributeLink> = rows
            .into_iter()
            .map(|row| ProductAttributeLink {
                attribute_id: row.attribute_id,
                attribute_name: row.attribute_name,
                selection_type: row.selection_type,
                is_required: row.is_required,
                is_archived: row.is_archived,
                options: Vec::new(),
            })
            .collect();

        for option in options {
            if let Some(link) = links.iter_mut().find(|l| l.attribute_id == option.attribute_id) {
                link.options.push(option);
            }
        }

        debug!(product_id = %product_id, links = links.len(), "Loaded attribute links");
        Ok(links)
    }

    /// Active, unarchived modifier groups linked to a product, each with
    /// all of its options. Inactive options are kept so a stale selection
    /// is reported as inactive rather than unknown.
    pub async fn product_modifier_groups(
        &self,
        business_id: &str,
        product_id: &str,
    ) -> DbResult<Vec<ModifierGroupState>> {
        let rows = sqlx::query_as::<_, ModifierGroupRow>(
            r#"
            SELECT
                g.id AS group_id,
                g.name AS group_name,
                g.min_selected,
                g.max_selected
            FROM product_modifier_groups pmg
            INNER JOIN modifier_groups g ON g.id = pmg.group_id
            WHERE pmg.product_id = ?1
              AND g.business_id = ?2
              AND g.is_active = 1
              AND g.is_archived = 0
            ORDER BY pmg.sort_order, g.name
            "#,
        )
        .bind(product_id)
        .bind(business_id)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let options = sqlx::query_as::<_, ModifierOptionState>(
            r#"
            SELECT o.id, o.group_id, o.name, o.price_delta_minor, o.is_active
            FROM modifier_options o
            INNER JOIN product_modifier_groups pmg ON pmg.group_id = o.group_id
            WHERE pmg.product_id = ?1
            ORDER BY o.sort_order, o.name
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        let mut groups: Vec<ModifierGroupState> = rows
            .into_iter()
            .map(|row| ModifierGroupState {
                group_id: row.group_id,
                group_name: row.group_name,
                min_selected: row.min_selected,
                max_selected: row.max_selected,
                options: Vec::new(),
            })
            .collect();

        // Options of filtered-out groups have nowhere to go and are dropped.
        for option in options {
            if let Some(group) = groups.iter_mut().find(|g| g.group_id == option.group_id) {
                group.options.push(option);
            }
        }

        Ok(groups)
    }

    // -------------------------------------------------------------------------
    // Writes (seed and tests)
    // -------------------------------------------------------------------------

    pub async fn insert_unit(
        &self,
        business_id: &str,
        name: &str,
        precision_scale: u32,
    ) -> DbResult<Unit> {
        let id = new_id();
        sqlx::query(
            r#"
            INSERT INTO units (id, business_id, name, precision_scale, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&id)
        .bind(business_id)
        .bind(name)
        .bind(i64::from(precision_scale))
        .bind(format_timestamp(&now()))
        .execute(&self.pool)
        .await?;

        Ok(Unit {
            id,
            business_id: business_id.to_string(),
            name: name.to_string(),
            precision_scale: i64::from(precision_scale),
        })
    }

    /// Creates a product with zero stock and returns it as stored.
    pub async fn insert_product(&self, product: &NewProduct) -> DbResult<Product> {
        let id = new_id();
        let ts = format_timestamp(&now());

        sqlx::query(
            r#"
            INSERT INTO products (
                id, business_id, name, sku, unit_id, price_minor, track_inventory,
                on_hand_cached, reorder_point, reorder_quantity, is_active,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9, 1, ?10, ?10)
            "#,
        )
        .bind(&id)
        .bind(&product.business_id)
        .bind(&product.name)
        .bind(&product.sku)
        .bind(&product.unit_id)
        .bind(product.price_minor)
        .bind(product.track_inventory)
        .bind(product.reorder_point.map(|q| q.scaled()))
        .bind(product.reorder_quantity.map(|q| q.scaled()))
        .bind(&ts)
        .execute(&self.pool)
        .await?;

        debug!(id = %id, name = %product.name, "Inserted product");

        self.get_product(&product.business_id, &id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    pub async fn set_product_active(&self, business_id: &str, id: &str, active: bool) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE products SET is_active = ?1, updated_at = ?2 WHERE id = ?3 AND business_id = ?4",
        )
        .bind(active)
        .bind(format_timestamp(&now()))
        .bind(id)
        .bind(business_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        Ok(())
    }

    pub async fn insert_device(&self, business_id: &str, name: &str) -> DbResult<Device> {
        let id = new_id();
        let created_at = now();
        sqlx::query(
            "INSERT INTO devices (id, business_id, name, is_active, created_at) VALUES (?1, ?2, ?3, 1, ?4)",
        )
        .bind(&id)
        .bind(business_id)
        .bind(name)
        .bind(format_timestamp(&created_at))
        .execute(&self.pool)
        .await?;

        Ok(Device {
            id,
            business_id: business_id.to_string(),
            name: name.to_string(),
            is_active: true,
            created_at,
        })
    }

    pub async fn set_device_active(&self, business_id: &str, id: &str, active: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE devices SET is_active = ?1 WHERE id = ?2 AND business_id = ?3")
            .bind(active)
            .bind(id)
            .bind(business_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Device", id));
        }
        Ok(())
    }

    pub async fn insert_store(&self, business_id: &str, name: &str) -> DbResult<Store> {
        let id = new_id();
        let created_at = now();
        sqlx::query(
            "INSERT INTO stores (id, business_id, name, is_active, created_at) VALUES (?1, ?2, ?3, 1, ?4)",
        )
        .bind(&id)
        .bind(business_id)
        .bind(name)
        .bind(format_timestamp(&created_at))
        .execute(&self.pool)
        .await?;

        Ok(Store {
            id,
            business_id: business_id.to_string(),
            name: name.to_string(),
            is_active: true,
            created_at,
        })
    }

    /// Creates an attribute. Names are unique per business.
    pub async fn insert_attribute(
        &self,
        business_id: &str,
        name: &str,
        selection_type: SelectionType,
        is_required: bool,
    ) -> DbResult<String> {
        let id = new_id();
        sqlx::query(
            r#"
            INSERT INTO attributes (id, business_id, name, selection_type, is_required, is_archived, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
            "#,
        )
        .bind(&id)
        .bind(business_id)
        .bind(name)
        .bind(selection_type)
        .bind(is_required)
        .bind(format_timestamp(&now()))
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            err if err.is_unique_violation() => {
                DbError::Domain(CoreError::AttributeNameTaken(name.to_string()))
            }
            err => err,
        })?;
        Ok(id)
    }

    /// Adds an option to an attribute. Option names are unique per attribute.
    pub async fn insert_attribute_option(
        &self,
        attribute_id: &str,
        name: &str,
        sort_order: i64,
    ) -> DbResult<String> {
        let id = new_id();
        sqlx::query(
            r#"
            INSERT INTO attribute_options (id, attribute_id, name, sort_order, is_archived, created_at)
            VALUES (?1, ?2, ?3, ?4, 0, ?5)
            "#,
        )
        .bind(&id)
        .bind(attribute_id)
        .bind(name)
        .bind(sort_order)
        .bind(format_timestamp(&now()))
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            err if err.is_unique_violation() => {
                DbError::Domain(CoreError::AttributeOptionNameTaken(name.to_string()))
            }
            err => err,
        })?;
        Ok(id)
    }

    /// Links an attribute to a product. `is_required_override` of `None`
    /// inherits the attribute's own flag.
    pub async fn link_product_attribute(
        &self,
        product_id: &str,
        attribute_id: &str,
        is_required_override: Option<bool>,
        sort_order: i64,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO product_attributes (product_id, attribute_id, is_required_override, sort_order)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(product_id)
        .bind(attribute_id)
        .bind(is_required_override)
        .bind(sort_order)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_attribute_archived(&self, attribute_id: &str, archived: bool) -> DbResult<()> {
        sqlx::query("UPDATE attributes SET is_archived = ?1 WHERE id = ?2")
            .bind(archived)
            .bind(attribute_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_attribute_option_archived(&self, option_id: &str, archived: bool) -> DbResult<()> {
        sqlx::query("UPDATE attribute_options SET is_archived = ?1 WHERE id = ?2")
            .bind(archived)
            .bind(option_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_modifier_group(
        &self,
        business_id: &str,
        name: &str,
        min_selected: i64,
        max_selected: Option<i64>,
    ) -> DbResult<String> {
        let id = new_id();
        sqlx::query(
            r#"
            INSERT INTO modifier_groups (id, business_id, name, min_selected, max_selected, is_active, is_archived, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 1, 0, ?6)
            "#,
        )
        .bind(&id)
        .bind(business_id)
        .bind(name)
        .bind(min_selected)
        .bind(max_selected)
        .bind(format_timestamp(&now()))
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn set_modifier_group_active(&self, group_id: &str, active: bool) -> DbResult<()> {
        sqlx::query("UPDATE modifier_groups SET is_active = ?1 WHERE id = ?2")
            .bind(active)
            .bind(group_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_modifier_option(
        &self,
        group_id: &str,
        name: &str,
        price_delta_minor: i64,
        sort_order: i64,
    ) -> DbResult<String> {
        let id = new_id();
        sqlx::query(
            r#"
            INSERT INTO modifier_options (id, group_id, name, price_delta_minor, sort_order, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)
            "#,
        )
        .bind(&id)
        .bind(group_id)
        .bind(name)
        .bind(price_delta_minor)
        .bind(sort_order)
        .bind(format_timestamp(&now()))
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn set_modifier_option_active(&self, option_id: &str, active: bool) -> DbResult<()> {
        sqlx::query("UPDATE modifier_options SET is_active = ?1 WHERE id = ?2")
            .bind(active)
            .bind(option_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn link_product_modifier_group(
        &self,
        product_id: &str,
        group_id: &str,
        sort_order: i64,
    ) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO product_modifier_groups (product_id, group_id, sort_order) VALUES (?1, ?2, ?3)",
        )
        .bind(product_id)
        .bind(group_id)
        .bind(sort_order)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_discount(&self, discount: &NewDiscount) -> DbResult<Discount> {
        let id = new_id();
        sqlx::query(
            r#"
            INSERT INTO discounts (id, business_id, name, discount_type, scope, value_minor,
                                   product_id, is_active, is_archived, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, 0, ?8)
            "#,
        )
        .bind(&id)
        .bind(&discount.business_id)
        .bind(&discount.name)
        .bind(discount.discount_type)
        .bind(discount.scope)
        .bind(discount.value_minor)
        .bind(&discount.product_id)
        .bind(format_timestamp(&now()))
        .execute(&self.pool)
        .await?;

        Ok(Discount {
            id,
            business_id: discount.business_id.clone(),
            name: discount.name.clone(),
            discount_type: discount.discount_type,
            scope: discount.scope,
            value_minor: discount.value_minor,
            product_id: discount.product_id.clone(),
            is_active: true,
            is_archived: false,
        })
    }

    pub async fn set_discount_archived(&self, id: &str, archived: bool) -> DbResult<()> {
        sqlx::query("UPDATE discounts SET is_archived = ?1 WHERE id = ?2")
            .bind(archived)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
