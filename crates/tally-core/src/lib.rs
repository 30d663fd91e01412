//! # tally-core: Pure Business Logic for Tally
//!
//! The checkout and inventory rules of Tally as pure functions with zero I/O
//! dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            HTTP controllers / mobile client (external)          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ CheckoutInput, AdjustStockInput        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             tally-service (orchestrators)                       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   money · quantity · attributes · modifiers · discount          │   │
//! │  │   checkout · inventory · types · validation · error             │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          tally-db (SQLite, ledger, sale commit)                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Money type and the minor-unit / decimal / basis-point codec
//! - [`quantity`] - Exact decimal quantities scaled by 10^5
//! - [`attributes`] - Attribute selection validation and snapshots
//! - [`modifiers`] - Modifier selection validation and price deltas
//! - [`discount`] - Sequential, clamped discount application
//! - [`checkout`] - Line pricing, stock pre-check, payments, sale drafts
//! - [`inventory`] - Movement sign rules, low stock, ledger views
//! - [`types`] - Catalog read models and stored sale rows
//! - [`error`] - Domain error types and stable codes
//! - [`validation`] - Field-level validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same input, same output
//! 2. **No I/O**: storage lives in tally-db
//! 3. **Integer Money**: minor units in i64, i128 for intermediates, no floats
//! 4. **Explicit Errors**: every failure is a typed [`CoreError`] with a code
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::money::multiply_minor_by_quantity;
//!
//! // 3 × 5.00
//! assert_eq!(multiply_minor_by_quantity(500, "3", 0).unwrap(), 1500);
//!
//! // A unit with two decimal places rejects a third.
//! assert!(multiply_minor_by_quantity(500, "1.123", 2).is_err());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod attributes;
pub mod checkout;
pub mod discount;
pub mod error;
pub mod inventory;
pub mod modifiers;
pub mod money;
pub mod quantity;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ErrorCode, ValidationError};
pub use money::{Money, MoneyInput};
pub use quantity::Quantity;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Business used by the seed binary and local tooling when none is
/// configured. Requests always carry their own business id.
pub const DEFAULT_BUSINESS_ID: &str = "00000000-0000-0000-0000-000000000001";

/// Maximum lines in a single checkout.
pub const MAX_CART_LINES: usize = 100;

/// Maximum idempotency key length accepted from clients.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;
