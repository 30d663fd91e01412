//! # API Error Type
//!
//! The one error shape that leaves this crate.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Tally                                  │
//! │                                                                         │
//! │  CheckoutService / InventoryService                                    │
//! │  Result<T, ApiError>                                                   │
//! │         │                                                               │
//! │         ├── CoreError  (validation, not found, conflicts)              │
//! │         │     └── code + status from ErrorCode, details for conflicts  │
//! │         │                                                               │
//! │         └── DbError    (storage)                                       │
//! │               ├── Domain(CoreError) → as above                         │
//! │               └── everything else   → DATABASE_ERROR (500), logged     │
//! │                                                                         │
//! │  HTTP layer serializes ApiError as-is:                                 │
//! │  { "code": "OUT_OF_STOCK", "message": "...", "status": 409,            │
//! │    "details": { "onHandCached": "2", "requestedQty": "3", ... } }      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use tally_core::{CoreError, ErrorCode};
use tally_db::DbError;

/// Error returned by every service operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,

    /// HTTP status the controller should answer with
    pub status: u16,

    /// Structured payload for conflicts the client can act on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
            status: code.http_status(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Internal, message)
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError {
            code: err.code(),
            message: err.to_string(),
            status: err.code().http_status(),
            details: err.details(),
        }
    }
}

/// Storage failures keep their detail in the log, not in the response.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Domain(core) => core.into(),
            DbError::NotFound { entity, id } if entity == "Product" => {
                CoreError::ProductNotFound(id).into()
            }
            DbError::PoolExhausted => {
                tracing::error!("Database pool exhausted");
                ApiError::new(ErrorCode::DatabaseError, "Database is busy, try again")
            }
            other => {
                tracing::error!(error = %other, "Database operation failed");
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_conflict_keeps_details() {
        let err: ApiError = CoreError::OutOfStock {
            product_id: "p1".into(),
            product_name: "Beans".into(),
            on_hand: "2".into(),
            requested: "3".into(),
            shortfall: "1".into(),
        }
        .into();

        assert_eq!(err.code, ErrorCode::OutOfStock);
        assert_eq!(err.status, 409);
        let details = err.details.unwrap();
        assert_eq!(details["onHandCached"], "2");
        assert_eq!(details["shortfall"], "1");
    }

    #[test]
    fn test_db_errors_are_opaque() {
        let err: ApiError = DbError::QueryFailed("near \"SELEC\": syntax error".into()).into();
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert_eq!(err.status, 500);
        assert!(!err.message.contains("SELEC"));
    }

    #[test]
    fn test_domain_db_error_uses_core_code() {
        let err: ApiError = DbError::Domain(CoreError::AttributeNameTaken("Size".into())).into();
        assert_eq!(err.code, ErrorCode::AttributeNameTaken);
        assert_eq!(err.status, 409);
    }

    #[test]
    fn test_serialized_shape() {
        let err = ApiError::from(CoreError::CartEmpty);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "CART_EMPTY");
        assert_eq!(json["status"], 400);
        assert!(json.get("details").is_none());
    }
}
