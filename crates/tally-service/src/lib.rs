//! # tally-service: Checkout and Inventory Services for Tally
//!
//! The two orchestrators an HTTP layer calls, plus the ambient pieces a
//! binary needs to host them.
//!
//! ## Modules
//!
//! - [`checkout`] - Idempotent, atomic checkout
//! - [`inventory`] - Stock adjustments and inventory read models
//! - [`cursor`] - Opaque keyset cursor for the movements list
//! - [`error`] - [`ApiError`], the only error type that leaves this crate
//! - [`config`] - TOML + environment configuration
//! - [`telemetry`] - `tracing` subscriber setup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_service::{telemetry, CheckoutService, InventoryService, ServiceConfig};
//! use tally_db::Database;
//!
//! let config = ServiceConfig::load(Some("tally.toml".as_ref()))?;
//! telemetry::init(&config.log.level);
//!
//! let db = Database::new(config.db_config()).await?;
//! let checkout = CheckoutService::new(db.clone());
//! let inventory = InventoryService::new(db, config.inventory.clone());
//!
//! let result = checkout.checkout(&business_id, &user_id, &input).await?;
//! ```

pub mod checkout;
pub mod config;
pub mod cursor;
pub mod error;
pub mod inventory;
pub mod telemetry;

pub use checkout::CheckoutService;
pub use config::{ConfigError, ServiceConfig};
pub use cursor::MovementCursor;
pub use error::{ApiError, ServiceResult};
pub use inventory::InventoryService;
