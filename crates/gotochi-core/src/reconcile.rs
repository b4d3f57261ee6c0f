//! Catalog ⋈ overlay join.

use crate::types::{CatalogItem, DisplayItem, OwnershipOverlay};

/// Join every catalog item with its overlay entry, keeping catalog order.
/// Items without an overlay entry are not owned.
pub fn merge(catalog: &[CatalogItem], overlay: &OwnershipOverlay) -> Vec<DisplayItem> {
    catalog
        .iter()
        .map(|item| DisplayItem {
            owned: overlay.is_owned(&item.key()),
            item: item.clone(),
        })
        .collect()
}

/// Flip one item in place and record the new value in the overlay.
/// Returns the new owned flag. Persisting is the caller's job.
pub fn toggle_ownership(item: &mut DisplayItem, overlay: &mut OwnershipOverlay) -> bool {
    item.owned = !item.owned;
    overlay.set_owned(item.key(), item.owned);
    item.owned
}
