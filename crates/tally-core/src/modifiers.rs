//! # Modifier Selection Validation
//!
//! Priced add-ons ("extra shot +50", "oat milk +75"). The server computes the
//! price delta from stored option prices; a client-sent total is only ever a
//! cross-check.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// A modifier option as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ModifierOptionState {
    pub id: String,
    pub group_id: String,
    pub name: String,
    pub price_delta_minor: i64,
    pub is_active: bool,
}

/// An active, non-archived modifier group linked to the product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifierGroupState {
    pub group_id: String,
    pub group_name: String,
    pub min_selected: i64,
    /// `None` means unbounded.
    pub max_selected: Option<i64>,
    pub options: Vec<ModifierOptionState>,
}

/// One validated option, frozen for the sale line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedModifier {
    pub option_id: String,
    pub group_id: String,
    pub option_name: String,
    pub group_name: String,
    pub price_delta_minor: i64,
}

/// Result of [`validate_modifier_selections`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifierSelection {
    /// Exact sum of the selected options' deltas.
    pub delta_minor: i64,
    pub rows: Vec<SelectedModifier>,
}

impl ModifierSelection {
    pub fn option_ids(&self) -> Vec<String> {
        self.rows.iter().map(|r| r.option_id.clone()).collect()
    }
}

/// Validates selected option ids against the product's linked groups.
///
/// Each id must be an active option of a linked group and appear once.
/// Every group's `min_selected..=max_selected` bound is enforced, including
/// groups with nothing selected. All failures are
/// `MODIFIER_SELECTION_INVALID`.
pub fn validate_modifier_selections(
    groups: &[ModifierGroupState],
    selected_option_ids: &[String],
) -> CoreResult<ModifierSelection> {
    let invalid = |reason: String| CoreError::ModifierSelectionInvalid { reason };

    let mut rows = Vec::with_capacity(selected_option_ids.len());
    let mut delta_minor: i64 = 0;

    for (idx, option_id) in selected_option_ids.iter().enumerate() {
        if selected_option_ids[..idx].contains(option_id) {
            return Err(invalid(format!("option {} selected more than once", option_id)));
        }

        let (group, option) = groups
            .iter()
            .find_map(|g| {
                g.options
                    .iter()
                    .find(|o| o.id == *option_id)
                    .map(|o| (g, o))
            })
            .ok_or_else(|| {
                invalid(format!("option {} is not available for this product", option_id))
            })?;

        if !option.is_active {
            return Err(invalid(format!("option '{}' is inactive", option.name)));
        }

        delta_minor = delta_minor
            .checked_add(option.price_delta_minor)
            .ok_or_else(|| invalid("modifier total is out of range".to_string()))?;

        rows.push(SelectedModifier {
            option_id: option.id.clone(),
            group_id: group.group_id.clone(),
            option_name: option.name.clone(),
            group_name: group.group_name.clone(),
            price_delta_minor: option.price_delta_minor,
        });
    }

    for group in groups {
        let count = rows.iter().filter(|r| r.group_id == group.group_id).count() as i64;
        if count < group.min_selected {
            return Err(invalid(format!(
                "'{}' needs at least {} selection(s), got {}",
                group.group_name, group.min_selected, count
            )));
        }
        if let Some(max) = group.max_selected {
            if count > max {
                return Err(invalid(format!(
                    "'{}' allows at most {} selection(s), got {}",
                    group.group_name, max, count
                )));
            }
        }
    }

    Ok(ModifierSelection { delta_minor, rows })
}

/// Compares a client-asserted modifier total with the computed one.
///
/// The asserted value is an integer string in minor units (a leading `-` is
/// allowed since deltas may be negative).
pub fn check_asserted_total(
    product_id: &str,
    computed_minor: i64,
    asserted: Option<&str>,
) -> CoreResult<()> {
    let Some(raw) = asserted else {
        return Ok(());
    };

    let digits = raw.strip_prefix('-').unwrap_or(raw);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CoreError::ModifierSelectionInvalid {
            reason: format!("totalModifiersDeltaMinor '{}' is not an integer", raw),
        });
    }
    let asserted_minor = raw.parse::<i64>().map_err(|_| CoreError::ModifierSelectionInvalid {
        reason: format!("totalModifiersDeltaMinor '{}' is out of range", raw),
    })?;

    if asserted_minor != computed_minor {
        return Err(CoreError::ModifierTotalMismatch {
            product_id: product_id.to_string(),
            computed_minor,
            asserted_minor,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn opt(id: &str, group: &str, delta: i64) -> ModifierOptionState {
        ModifierOptionState {
            id: id.to_string(),
            group_id: group.to_string(),
            name: id.to_uppercase(),
            price_delta_minor: delta,
            is_active: true,
        }
    }

    fn milk_group() -> ModifierGroupState {
        ModifierGroupState {
            group_id: "milk".to_string(),
            group_name: "Milk".to_string(),
            min_selected: 0,
            max_selected: Some(1),
            options: vec![opt("oat", "milk", 75), opt("soy", "milk", 50)],
        }
    }

    fn extras_group() -> ModifierGroupState {
        ModifierGroupState {
            group_id: "extras".to_string(),
            group_name: "Extras".to_string(),
            min_selected: 0,
            max_selected: None,
            options: vec![opt("shot", "extras", 100), opt("syrup", "extras", 50)],
        }
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_delta_is_exact_sum() {
        let sel = validate_modifier_selections(
            &[milk_group(), extras_group()],
            &ids(&["shot", "syrup"]),
        )
        .unwrap();
        assert_eq!(sel.delta_minor, 150);
        assert_eq!(sel.rows.len(), 2);
        assert_eq!(sel.rows[0].group_name, "Extras");
        assert_eq!(sel.option_ids(), ids(&["shot", "syrup"]));
    }

    #[test]
    fn test_max_selected_enforced() {
        let err =
            validate_modifier_selections(&[milk_group()], &ids(&["oat", "soy"])).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ModifierSelectionInvalid);
    }

    #[test]
    fn test_min_selected_enforced_when_nothing_picked() {
        let mut group = milk_group();
        group.min_selected = 1;
        let err = validate_modifier_selections(&[group], &[]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ModifierSelectionInvalid);
    }

    #[test]
    fn test_unknown_inactive_and_duplicate_options_rejected() {
        let mut group = extras_group();
        group.options[1].is_active = false;
        let groups = vec![group];

        for bad in [ids(&["nope"]), ids(&["syrup"]), ids(&["shot", "shot"])] {
            let err = validate_modifier_selections(&groups, &bad).unwrap_err();
            assert_eq!(err.code(), ErrorCode::ModifierSelectionInvalid, "{bad:?}");
        }
    }

    #[test]
    fn test_asserted_total_cross_check() {
        assert!(check_asserted_total("p1", 150, None).is_ok());
        assert!(check_asserted_total("p1", 150, Some("150")).is_ok());
        assert!(check_asserted_total("p1", -25, Some("-25")).is_ok());

        let err = check_asserted_total("p1", 150, Some("100")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ModifierTotalMismatch);
        let details = err.details().unwrap();
        assert_eq!(details["computedMinor"], "150");
        assert_eq!(details["assertedMinor"], "100");

        let err = check_asserted_total("p1", 150, Some("1.5")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ModifierSelectionInvalid);
    }
}
