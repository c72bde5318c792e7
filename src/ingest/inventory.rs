//! Inventory merge policy for product updates.
//!
//! Update webhooks regularly omit inventory fields. Incoming variants are merged with the
//! stored ones (matched by `variant_id`) so metadata-only updates never wipe stock.

use crate::models::product::Variant;

/// Merges one incoming variant with the stored variant of the same id.
///
/// 1. Empty incoming management keeps the stored management and policy.
/// 2. Untracked variants (empty or `not_managed`) keep a positive stored quantity.
/// 3. Tracked variants take the incoming quantity, zero included; an omitted quantity keeps the stored one.
pub fn merge_variant(existing: &Variant, incoming: Variant) -> Variant {
    let mut merged = incoming;

    let incoming_management_empty = merged
        .inventory_management
        .as_deref()
        .is_none_or(str::is_empty);
    if incoming_management_empty {
        merged.inventory_management = existing.inventory_management.clone();
        merged.inventory_policy = existing.inventory_policy.clone();
    }

    let untracked = merged
        .inventory_management
        .as_deref()
        .is_none_or(|management| management.is_empty() || management == "not_managed");
    let existing_quantity = existing.inventory_quantity.unwrap_or(0);

    if untracked {
        if existing_quantity > 0 {
            merged.inventory_quantity = existing.inventory_quantity;
        }
    } else if merged.inventory_quantity.is_none() {
        merged.inventory_quantity = existing.inventory_quantity;
    }

    if merged.inventory_item_id.is_none() {
        merged.inventory_item_id = existing.inventory_item_id.clone();
    }
    if merged.barcode.is_none() {
        merged.barcode = existing.barcode.clone();
    }

    merged
}

/// Applies [`merge_variant`] to every incoming variant that matches a stored one.
///
/// New variants pass through unchanged; stored variants missing from the payload are dropped.
pub fn merge_variants(existing: &[Variant], incoming: Vec<Variant>) -> Vec<Variant> {
    incoming
        .into_iter()
        .map(|variant| {
            match existing
                .iter()
                .find(|stored| stored.variant_id == variant.variant_id)
            {
                Some(stored) => merge_variant(stored, variant),
                None => variant,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(quantity: i64, management: &str) -> Variant {
        Variant {
            variant_id: "1".into(),
            inventory_quantity: Some(quantity),
            inventory_management: Some(management.into()),
            inventory_policy: Some("deny".into()),
            inventory_item_id: Some("inv-1".into()),
            ..Variant::default()
        }
    }

    fn incoming(quantity: Option<i64>, management: Option<&str>) -> Variant {
        Variant {
            variant_id: "1".into(),
            inventory_quantity: quantity,
            inventory_management: management.map(str::to_string),
            ..Variant::default()
        }
    }

    #[test]
    fn empty_management_preserves_stock_and_management() {
        let merged = merge_variant(&stored(7, "shopify"), incoming(None, Some("")));
        assert_eq!(merged.inventory_quantity, Some(7));
        assert_eq!(merged.inventory_management.as_deref(), Some("shopify"));
        assert_eq!(merged.inventory_policy.as_deref(), Some("deny"));
        assert_eq!(merged.inventory_item_id.as_deref(), Some("inv-1"));
    }

    #[test]
    fn empty_management_with_explicit_zero_is_trusted_once_tracked() {
        // management falls back to "shopify", so the explicit zero is a real stock reading
        let merged = merge_variant(&stored(7, "shopify"), incoming(Some(0), Some("")));
        assert_eq!(merged.inventory_quantity, Some(0));
    }

    #[test]
    fn untracked_variant_keeps_positive_stock() {
        let merged = merge_variant(&stored(4, "not_managed"), incoming(Some(0), None));
        assert_eq!(merged.inventory_quantity, Some(4));

        let merged = merge_variant(&stored(4, "shopify"), incoming(Some(0), Some("not_managed")));
        assert_eq!(merged.inventory_quantity, Some(4));
    }

    #[test]
    fn untracked_variant_with_no_stock_takes_incoming() {
        let merged = merge_variant(&stored(0, "not_managed"), incoming(Some(3), None));
        assert_eq!(merged.inventory_quantity, Some(3));
    }

    #[test]
    fn tracked_variant_trusts_incoming_zero() {
        let merged = merge_variant(&stored(7, "shopify"), incoming(Some(0), Some("shopify")));
        assert_eq!(merged.inventory_quantity, Some(0));
        assert_eq!(merged.inventory_policy, None);
    }

    #[test]
    fn unmatched_variants_pass_through() {
        let mut other = incoming(Some(2), Some("shopify"));
        other.variant_id = "2".into();
        let merged = merge_variants(&[stored(7, "shopify")], vec![other.clone()]);
        assert_eq!(merged, vec![other]);
    }
}
