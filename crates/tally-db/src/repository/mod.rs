//! # Repository Module
//!
//! Database repository implementations for Tally.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories                                         │
//! │                                                                         │
//! │  tally-service                                                         │
//! │       │                                                                 │
//! │       │  db.inventory().append_adjustment(&movement)                   │
//! │       ▼                                                                 │
//! │  CatalogRepository    reads live catalog state, seed/test writes       │
//! │  InventoryRepository  ledger append, conditional counter, projections  │
//! │  SaleRepository       one-transaction sale commit, read-back           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each repository holds a clone of the pool. The ledger primitives that
//! must run inside someone else's transaction take a `&mut SqliteConnection`
//! instead.

use chrono::{DateTime, SubsecRound, Utc};

pub mod catalog;
pub mod inventory;
pub mod sale;

/// Current time truncated to what the timestamp columns store.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// New UUID v4 id.
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
