//! Opaque keyset cursor for the movements list.
//!
//! The client sees base64url(JSON `{"createdAt": ..., "id": ...}`) and
//! hands it back verbatim.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_core::{format_timestamp, CoreError, CoreResult, InventoryMovement};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementCursor {
    pub created_at: DateTime<Utc>,
    pub id: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CursorPayload {
    created_at: String,
    id: String,
}

impl MovementCursor {
    /// Cursor positioned after `movement` in newest-first order.
    pub fn after(movement: &InventoryMovement) -> Self {
        MovementCursor {
            created_at: movement.created_at,
            id: movement.id.clone(),
        }
    }

    pub fn encode(&self) -> String {
        let payload = CursorPayload {
            created_at: format_timestamp(&self.created_at),
            id: self.id.clone(),
        };
        // Serializing two strings cannot fail.
        let json = serde_json::to_vec(&payload).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(raw: &str) -> CoreResult<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(raw.trim())
            .map_err(|_| CoreError::InvalidCursor("not base64url".to_string()))?;
        let payload: CursorPayload = serde_json::from_slice(&bytes)
            .map_err(|_| CoreError::InvalidCursor("malformed payload".to_string()))?;
        let created_at = DateTime::parse_from_rfc3339(&payload.created_at)
            .map_err(|_| CoreError::InvalidCursor("bad timestamp".to_string()))?
            .with_timezone(&Utc);
        if payload.id.is_empty() {
            return Err(CoreError::InvalidCursor("missing id".to_string()));
        }
        Ok(MovementCursor {
            created_at,
            id: payload.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cursor_survives_encoding() {
        let cursor = MovementCursor {
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap(),
            id: "mv-42".to_string(),
        };
        let encoded = cursor.encode();
        assert!(!encoded.contains('='));
        assert_eq!(MovementCursor::decode(&encoded).unwrap(), cursor);
    }

    #[test]
    fn test_garbage_is_invalid_cursor() {
        for raw in ["%%%", "bm90IGpzb24", ""] {
            let err = MovementCursor::decode(raw).unwrap_err();
            assert!(matches!(err, CoreError::InvalidCursor(_)), "{raw}");
        }
    }

    #[test]
    fn test_bad_timestamp_is_invalid_cursor() {
        let raw = URL_SAFE_NO_PAD.encode(br#"{"createdAt":"yesterday","id":"x"}"#);
        assert!(matches!(
            MovementCursor::decode(&raw),
            Err(CoreError::InvalidCursor(_))
        ));
    }
}
