//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                         │
//! │  ├── CoreError        - Business rule violations (carries ErrorCode)   │
//! │  ├── ValidationError  - Generic input validation failures              │
//! │  └── ErrorCode        - Stable machine-readable code + HTTP status     │
//! │                                                                         │
//! │  tally-db errors (separate crate)                                      │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  tally-service errors                                                  │
//! │  └── ApiError         - What callers see (serialized)                  │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ApiError ← DbError                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (product ID, amounts, etc.)
//! 3. Every variant maps to exactly one stable [`ErrorCode`]
//! 4. Stock and payment conflicts expose structured [`CoreError::details`]

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

// =============================================================================
// Error Code
// =============================================================================

/// Stable machine-readable error codes.
///
/// Serialized as `SCREAMING_SNAKE_CASE` (e.g. `OUT_OF_STOCK`). Clients switch
/// on these, so existing names must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation
    ValidationError,
    InvalidQuantity,
    InvalidQuantityPrecision,
    InvalidPrice,
    InvalidPaymentAmount,
    AttributeInvalid,
    AttributeSelectionInvalid,
    AttributeRequired,
    ModifierSelectionInvalid,
    ModifierTotalMismatch,
    DiscountInvalidValue,
    CartEmpty,
    InvalidCursor,
    IdempotencyKeyRequired,

    // Not found
    ProductNotFound,
    DeviceNotFound,
    DiscountNotFound,
    StoreNotFound,

    // Conflict
    ProductInactive,
    AttributeArchived,
    OutOfStock,
    InsufficientStock,
    InsufficientPayment,
    AttributeNameTaken,
    AttributeOptionNameTaken,
    IdempotencyKeyConflict,

    // Infrastructure
    DatabaseError,
    Internal,
}

impl ErrorCode {
    /// HTTP status equivalent for this code.
    pub const fn http_status(&self) -> u16 {
        match self {
            ErrorCode::ValidationError
            | ErrorCode::InvalidQuantity
            | ErrorCode::InvalidQuantityPrecision
            | ErrorCode::InvalidPrice
            | ErrorCode::InvalidPaymentAmount
            | ErrorCode::DiscountInvalidValue
            | ErrorCode::CartEmpty
            | ErrorCode::InvalidCursor
            | ErrorCode::IdempotencyKeyRequired => 400,

            ErrorCode::AttributeInvalid
            | ErrorCode::AttributeSelectionInvalid
            | ErrorCode::AttributeRequired
            | ErrorCode::ModifierSelectionInvalid
            | ErrorCode::ModifierTotalMismatch => 422,

            ErrorCode::ProductNotFound
            | ErrorCode::DeviceNotFound
            | ErrorCode::DiscountNotFound
            | ErrorCode::StoreNotFound => 404,

            ErrorCode::ProductInactive
            | ErrorCode::AttributeArchived
            | ErrorCode::OutOfStock
            | ErrorCode::InsufficientStock
            | ErrorCode::InsufficientPayment
            | ErrorCode::AttributeNameTaken
            | ErrorCode::AttributeOptionNameTaken
            | ErrorCode::IdempotencyKeyConflict => 409,

            ErrorCode::DatabaseError | ErrorCode::Internal => 500,
        }
    }

    /// The wire representation (`"OUT_OF_STOCK"`).
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::InvalidQuantity => "INVALID_QUANTITY",
            ErrorCode::InvalidQuantityPrecision => "INVALID_QUANTITY_PRECISION",
            ErrorCode::InvalidPrice => "INVALID_PRICE",
            ErrorCode::InvalidPaymentAmount => "INVALID_PAYMENT_AMOUNT",
            ErrorCode::AttributeInvalid => "ATTRIBUTE_INVALID",
            ErrorCode::AttributeSelectionInvalid => "ATTRIBUTE_SELECTION_INVALID",
            ErrorCode::AttributeRequired => "ATTRIBUTE_REQUIRED",
            ErrorCode::ModifierSelectionInvalid => "MODIFIER_SELECTION_INVALID",
            ErrorCode::ModifierTotalMismatch => "MODIFIER_TOTAL_MISMATCH",
            ErrorCode::DiscountInvalidValue => "DISCOUNT_INVALID_VALUE",
            ErrorCode::CartEmpty => "CART_EMPTY",
            ErrorCode::InvalidCursor => "INVALID_CURSOR",
            ErrorCode::IdempotencyKeyRequired => "IDEMPOTENCY_KEY_REQUIRED",
            ErrorCode::ProductNotFound => "PRODUCT_NOT_FOUND",
            ErrorCode::DeviceNotFound => "DEVICE_NOT_FOUND",
            ErrorCode::DiscountNotFound => "DISCOUNT_NOT_FOUND",
            ErrorCode::StoreNotFound => "STORE_NOT_FOUND",
            ErrorCode::ProductInactive => "PRODUCT_INACTIVE",
            ErrorCode::AttributeArchived => "ATTRIBUTE_ARCHIVED",
            ErrorCode::OutOfStock => "OUT_OF_STOCK",
            ErrorCode::InsufficientStock => "INSUFFICIENT_STOCK",
            ErrorCode::InsufficientPayment => "INSUFFICIENT_PAYMENT",
            ErrorCode::AttributeNameTaken => "ATTRIBUTE_NAME_TAKEN",
            ErrorCode::AttributeOptionNameTaken => "ATTRIBUTE_OPTION_NAME_TAKEN",
            ErrorCode::IdempotencyKeyConflict => "IDEMPOTENCY_KEY_CONFLICT",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// Every variant is raised before any write happens, except the two stock
/// conflicts which may also come back from the storage layer's conditional
/// update.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Quantity string is malformed, zero where a positive value is needed,
    /// or outside the representable range.
    #[error("Invalid quantity '{value}': {reason}")]
    InvalidQuantity { value: String, reason: String },

    /// Quantity carries more fractional digits than the unit allows.
    #[error("Quantity '{value}' exceeds the unit precision of {max_scale} decimal places")]
    InvalidQuantityPrecision { value: String, max_scale: u32 },

    #[error("Invalid price: {reason}")]
    InvalidPrice { reason: String },

    #[error("Invalid payment amount: {reason}")]
    InvalidPaymentAmount { reason: String },

    /// A required attribute has no active options, so no valid selection
    /// exists and the product cannot be sold.
    #[error("Attribute {attribute_id} is misconfigured: {reason}")]
    AttributeInvalid {
        attribute_id: String,
        reason: String,
    },

    #[error("Invalid attribute selection: {reason}")]
    AttributeSelectionInvalid { reason: String },

    #[error("Attribute '{attribute_name}' ({attribute_id}) requires a selection")]
    AttributeRequired {
        attribute_id: String,
        attribute_name: String,
    },

    #[error("Attribute {attribute_id} is archived")]
    AttributeArchived { attribute_id: String },

    #[error("Invalid modifier selection: {reason}")]
    ModifierSelectionInvalid { reason: String },

    /// Client-asserted modifier total disagrees with the server computation.
    #[error(
        "Modifier total mismatch for product {product_id}: computed {computed_minor}, client sent {asserted_minor}"
    )]
    ModifierTotalMismatch {
        product_id: String,
        computed_minor: i64,
        asserted_minor: i64,
    },

    #[error("Invalid discount value: {reason}")]
    DiscountInvalidValue { reason: String },

    #[error("Cart must contain at least one line")]
    CartEmpty,

    #[error("Invalid pagination cursor: {0}")]
    InvalidCursor(String),

    #[error("An idempotency key is required")]
    IdempotencyKeyRequired,

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Discount not found: {0}")]
    DiscountNotFound(String),

    #[error("Store not found: {0}")]
    StoreNotFound(String),

    #[error("Product is inactive: {0}")]
    ProductInactive(String),

    /// Checkout requested more than is on hand.
    ///
    /// ## User Workflow
    /// ```text
    /// Cart: 3 × Espresso Beans        on hand: 2
    ///      │
    ///      ▼
    /// OutOfStock { requested: "3", on_hand: "2", shortfall: "1" }
    ///      │
    ///      ▼
    /// UI shows: "need 1 more unit"
    /// ```
    #[error(
        "Out of stock for {product_name} ({product_id}): on hand {on_hand}, requested {requested}, short {shortfall}"
    )]
    OutOfStock {
        product_id: String,
        product_name: String,
        on_hand: String,
        requested: String,
        shortfall: String,
    },

    /// A stock adjustment would drive a tracked product below zero.
    #[error("Insufficient stock for {product_id}: on hand {on_hand}, delta {quantity_delta}")]
    InsufficientStock {
        product_id: String,
        on_hand: String,
        quantity_delta: String,
    },

    #[error("Insufficient payment: paid {paid_minor}, total {total_minor}")]
    InsufficientPayment { total_minor: i64, paid_minor: i64 },

    #[error("Attribute name '{0}' is already taken")]
    AttributeNameTaken(String),

    #[error("Attribute option name '{0}' is already taken")]
    AttributeOptionNameTaken(String),

    /// A key derived for a sale movement is already held by another
    /// movement, usually a manual adjustment that reused it.
    #[error("Idempotency key '{0}' is already used by another movement")]
    IdempotencyKeyConflict(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// The stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::InvalidQuantity { .. } => ErrorCode::InvalidQuantity,
            CoreError::InvalidQuantityPrecision { .. } => ErrorCode::InvalidQuantityPrecision,
            CoreError::InvalidPrice { .. } => ErrorCode::InvalidPrice,
            CoreError::InvalidPaymentAmount { .. } => ErrorCode::InvalidPaymentAmount,
            CoreError::AttributeInvalid { .. } => ErrorCode::AttributeInvalid,
            CoreError::AttributeSelectionInvalid { .. } => ErrorCode::AttributeSelectionInvalid,
            CoreError::AttributeRequired { .. } => ErrorCode::AttributeRequired,
            CoreError::AttributeArchived { .. } => ErrorCode::AttributeArchived,
            CoreError::ModifierSelectionInvalid { .. } => ErrorCode::ModifierSelectionInvalid,
            CoreError::ModifierTotalMismatch { .. } => ErrorCode::ModifierTotalMismatch,
            CoreError::DiscountInvalidValue { .. } => ErrorCode::DiscountInvalidValue,
            CoreError::CartEmpty => ErrorCode::CartEmpty,
            CoreError::InvalidCursor(_) => ErrorCode::InvalidCursor,
            CoreError::IdempotencyKeyRequired => ErrorCode::IdempotencyKeyRequired,
            CoreError::ProductNotFound(_) => ErrorCode::ProductNotFound,
            CoreError::DeviceNotFound(_) => ErrorCode::DeviceNotFound,
            CoreError::DiscountNotFound(_) => ErrorCode::DiscountNotFound,
            CoreError::StoreNotFound(_) => ErrorCode::StoreNotFound,
            CoreError::ProductInactive(_) => ErrorCode::ProductInactive,
            CoreError::OutOfStock { .. } => ErrorCode::OutOfStock,
            CoreError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            CoreError::InsufficientPayment { .. } => ErrorCode::InsufficientPayment,
            CoreError::AttributeNameTaken(_) => ErrorCode::AttributeNameTaken,
            CoreError::AttributeOptionNameTaken(_) => ErrorCode::AttributeOptionNameTaken,
            CoreError::IdempotencyKeyConflict(_) => ErrorCode::IdempotencyKeyConflict,
            CoreError::Validation(_) => ErrorCode::ValidationError,
        }
    }

    /// Structured payload for conflicts the client can remediate.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            CoreError::OutOfStock {
                product_id,
                product_name,
                on_hand,
                requested,
                shortfall,
            } => Some(serde_json::json!({
                "productId": product_id,
                "productName": product_name,
                "onHandCached": on_hand,
                "requestedQty": requested,
                "shortfall": shortfall,
            })),
            CoreError::InsufficientStock {
                product_id,
                on_hand,
                quantity_delta,
            } => Some(serde_json::json!({
                "productId": product_id,
                "onHandCached": on_hand,
                "quantityDelta": quantity_delta,
            })),
            CoreError::InsufficientPayment {
                total_minor,
                paid_minor,
            } => Some(serde_json::json!({
                "totalMinor": total_minor.to_string(),
                "paidTotalMinor": paid_minor.to_string(),
                "shortfallMinor": (total_minor - paid_minor).to_string(),
            })),
            CoreError::ModifierTotalMismatch {
                product_id,
                computed_minor,
                asserted_minor,
            } => Some(serde_json::json!({
                "productId": product_id,
                "computedMinor": computed_minor.to_string(),
                "assertedMinor": asserted_minor.to_string(),
            })),
            _ => None,
        }
    }

    pub(crate) fn invalid_quantity(value: &str, reason: impl Into<String>) -> Self {
        CoreError::InvalidQuantity {
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Generic field checks that do not have a dedicated business code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., invalid UUID, invalid date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
