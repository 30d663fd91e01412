//! # Attribute Selection Validation
//!
//! Re-derives a cart line's attribute selections from stored catalog state.
//!
//! ```text
//! client: [{attributeId: A, optionId: o2}, ...]
//!             │
//!             ▼
//!   validate_attribute_selections(links, selections)
//!             │   links = every attribute linked to the product,
//!             │           with its options and archive flags
//!             ▼
//! snapshot: [{attributeId: A, optionId: o2,
//!             attributeNameSnapshot: "Size", optionNameSnapshot: "Large"}]
//! ```
//!
//! Names in the snapshot always come from the catalog. Anything the client
//! sends besides the two ids is ignored.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::types::SelectionType;

/// One `{attributeId, optionId}` pair from the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AttributeSelectionInput {
    pub attribute_id: String,
    pub option_id: String,
}

/// An option of a linked attribute, as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct AttributeOptionState {
    pub id: String,
    pub attribute_id: String,
    pub name: String,
    pub is_archived: bool,
}

/// An attribute linked to a product, with the link's effective settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductAttributeLink {
    pub attribute_id: String,
    pub attribute_name: String,
    pub selection_type: SelectionType,
    /// Link-level override if set, else the attribute default.
    pub is_required: bool,
    pub is_archived: bool,
    pub options: Vec<AttributeOptionState>,
}

impl ProductAttributeLink {
    fn active_options(&self) -> impl Iterator<Item = &AttributeOptionState> {
        self.options.iter().filter(|o| !o.is_archived)
    }
}

/// Immutable copy stored with the sale line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AttributeSnapshot {
    pub attribute_id: String,
    pub option_id: String,
    pub attribute_name_snapshot: String,
    pub option_name_snapshot: String,
}

/// Validates a line's attribute selections against the product's links.
///
/// Products with no linked attributes accept any input and yield no
/// snapshots. Otherwise:
/// - every selected attribute must be linked (`ATTRIBUTE_SELECTION_INVALID`)
///   and not archived (`ATTRIBUTE_ARCHIVED`)
/// - a required attribute with no active options blocks the sale
///   (`ATTRIBUTE_INVALID`)
/// - a required attribute needs a selection (`ATTRIBUTE_REQUIRED`)
/// - `SINGLE` attributes take at most one option, an option may be picked
///   once, and it must exist and not be archived
///   (`ATTRIBUTE_SELECTION_INVALID`)
///
/// Snapshots come out in attribute sort order, then option sort order, as
/// `links` and their options are loaded; the order the client listed them
/// in does not matter.
pub fn validate_attribute_selections(
    links: &[ProductAttributeLink],
    selections: &[AttributeSelectionInput],
) -> CoreResult<Vec<AttributeSnapshot>> {
    if links.is_empty() {
        return Ok(Vec::new());
    }

    // Group by attribute, keeping first-seen order.
    let mut grouped: Vec<(&str, Vec<&str>)> = Vec::new();
    for sel in selections {
        match grouped.iter_mut().find(|(id, _)| *id == sel.attribute_id) {
            Some((_, options)) => options.push(sel.option_id.as_str()),
            None => grouped.push((sel.attribute_id.as_str(), vec![sel.option_id.as_str()])),
        }
    }

    for (attribute_id, _) in &grouped {
        let link = links
            .iter()
            .find(|l| l.attribute_id == *attribute_id)
            .ok_or_else(|| CoreError::AttributeSelectionInvalid {
                reason: format!("attribute {} is not linked to this product", attribute_id),
            })?;
        if link.is_archived {
            return Err(CoreError::AttributeArchived {
                attribute_id: attribute_id.to_string(),
            });
        }
    }

    let mut snapshots = Vec::new();
    for link in links.iter().filter(|l| !l.is_archived) {
        let selected = grouped
            .iter()
            .find(|(id, _)| *id == link.attribute_id)
            .map(|(_, options)| options.as_slice())
            .unwrap_or(&[]);

        if link.is_required {
            if link.active_options().next().is_none() {
                return Err(CoreError::AttributeInvalid {
                    attribute_id: link.attribute_id.clone(),
                    reason: "required attribute has no active options".to_string(),
                });
            }
            if selected.is_empty() {
                return Err(CoreError::AttributeRequired {
                    attribute_id: link.attribute_id.clone(),
                    attribute_name: link.attribute_name.clone(),
                });
            }
        }

        if link.selection_type == SelectionType::Single && selected.len() > 1 {
            return Err(CoreError::AttributeSelectionInvalid {
                reason: format!(
                    "attribute '{}' allows a single option, got {}",
                    link.attribute_name,
                    selected.len()
                ),
            });
        }

        for (idx, option_id) in selected.iter().enumerate() {
            if selected[..idx].contains(option_id) {
                return Err(CoreError::AttributeSelectionInvalid {
                    reason: format!("option {} selected more than once", option_id),
                });
            }
            if !link.active_options().any(|o| o.id == *option_id) {
                return Err(CoreError::AttributeSelectionInvalid {
                    reason: format!(
                        "option {} is not an active option of '{}'",
                        option_id, link.attribute_name
                    ),
                });
            }
        }

        snapshots.extend(
            link.active_options()
                .filter(|o| selected.contains(&o.id.as_str()))
                .map(|option| AttributeSnapshot {
                    attribute_id: link.attribute_id.clone(),
                    option_id: option.id.clone(),
                    attribute_name_snapshot: link.attribute_name.clone(),
                    option_name_snapshot: option.name.clone(),
                }),
        );
    }

    Ok(snapshots)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn option(id: &str, attribute_id: &str, name: &str, archived: bool) -> AttributeOptionState {
        AttributeOptionState {
            id: id.to_string(),
            attribute_id: attribute_id.to_string(),
            name: name.to_string(),
            is_archived: archived,
        }
    }

    fn size_link(required: bool) -> ProductAttributeLink {
        ProductAttributeLink {
            attribute_id: "size".to_string(),
            attribute_name: "Size".to_string(),
            selection_type: SelectionType::Single,
            is_required: required,
            is_archived: false,
            options: vec![
                option("s", "size", "Small", false),
                option("l", "size", "Large", false),
                option("xl", "size", "Extra Large", true),
            ],
        }
    }

    fn toppings_link() -> ProductAttributeLink {
        ProductAttributeLink {
            attribute_id: "top".to_string(),
            attribute_name: "Toppings".to_string(),
            selection_type: SelectionType::Multi,
            is_required: false,
            is_archived: false,
            options: vec![
                option("cheese", "top", "Cheese", false),
                option("olive", "top", "Olive", false),
            ],
        }
    }

    fn pick(attribute_id: &str, option_id: &str) -> AttributeSelectionInput {
        AttributeSelectionInput {
            attribute_id: attribute_id.to_string(),
            option_id: option_id.to_string(),
        }
    }

    #[test]
    fn test_unlinked_product_ignores_input() {
        let out = validate_attribute_selections(&[], &[pick("whatever", "x")]).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_snapshots_use_catalog_names() {
        let links = vec![size_link(true), toppings_link()];
        let out = validate_attribute_selections(
            &links,
            &[pick("top", "olive"), pick("size", "l"), pick("top", "cheese")],
        )
        .unwrap();

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].attribute_name_snapshot, "Size");
        assert_eq!(out[0].option_name_snapshot, "Large");
        // Option sort order, not the order the client sent.
        assert_eq!(out[1].option_id, "cheese");
        assert_eq!(out[2].option_id, "olive");
    }

    #[test]
    fn test_required_attribute_missing() {
        let err = validate_attribute_selections(&[size_link(true)], &[]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::AttributeRequired);
    }

    #[test]
    fn test_required_attribute_without_active_options_is_misconfigured() {
        let mut link = size_link(true);
        for o in &mut link.options {
            o.is_archived = true;
        }
        let err = validate_attribute_selections(&[link], &[pick("size", "s")]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::AttributeInvalid);
    }

    #[test]
    fn test_single_selection_rejects_two_options() {
        let err =
            validate_attribute_selections(&[size_link(false)], &[pick("size", "s"), pick("size", "l")])
                .unwrap_err();
        assert_eq!(err.code(), ErrorCode::AttributeSelectionInvalid);
    }

    #[test]
    fn test_unknown_or_archived_option_rejected() {
        let links = vec![size_link(false)];
        for bad in ["xl", "nope"] {
            let err = validate_attribute_selections(&links, &[pick("size", bad)]).unwrap_err();
            assert_eq!(err.code(), ErrorCode::AttributeSelectionInvalid, "option {bad}");
        }
    }

    #[test]
    fn test_unlinked_attribute_rejected() {
        let err = validate_attribute_selections(&[size_link(false)], &[pick("color", "red")])
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::AttributeSelectionInvalid);
    }

    #[test]
    fn test_archived_attribute_rejected() {
        let mut archived = toppings_link();
        archived.is_archived = true;
        let err = validate_attribute_selections(
            &[size_link(false), archived],
            &[pick("top", "cheese")],
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::AttributeArchived);
    }

    #[test]
    fn test_duplicate_option_rejected() {
        let err = validate_attribute_selections(
            &[toppings_link()],
            &[pick("top", "cheese"), pick("top", "cheese")],
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::AttributeSelectionInvalid);
    }
}
