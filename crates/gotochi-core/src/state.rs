//! ============================================================================
//! Collection State - Owned application state and its recompute graph
//! ============================================================================
//! Holds the catalog, the ownership overlay and everything derived from them.
//! Each mutation names the derivations it triggers:
//!
//! | mutation          | reconcile | filter | cluster          |
//! |-------------------|-----------|--------|------------------|
//! | replace_catalog   | yes       | yes    | if map is active |
//! | replace_overlay   | yes       | yes    | if map is active |
//! | set_criteria      | no        | yes    | if map is active |
//! | toggle            | in place  | yes    | if map is active |
//! | enter_map_view    | no        | no     | yes              |
//!
//! Visible positions (the index into the filtered list) are the handle the
//! list view, the markers and the detail cursor all share.
//! ============================================================================

use serde::Serialize;
use tracing::debug;

use crate::cluster::{build_markers, MarkerGroup};
use crate::filter::{filter_indices, CategoryFilter, FilterCriteria, StatusFilter};
use crate::reconcile::{merge, toggle_ownership};
use crate::types::{CatalogItem, DisplayItem, OwnershipOverlay, Region};

/// Which view is being shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ViewMode {
    #[default]
    List,
    Map,
}

/// What the detail pane shows for the item under the cursor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailView {
    /// Position in the visible list
    pub position: usize,
    /// Number of visible items
    pub total: usize,
    pub image: Option<String>,
    pub glyph: String,
    pub title: String,
    /// "{region} | {category}"
    pub subtitle: String,
    pub owned: bool,
}

/// Progress summary over the whole merged list
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    pub owned: usize,
    pub total: usize,
    pub percentage: f64,
}

#[derive(Debug, Default)]
pub struct CollectionState {
    catalog: Vec<CatalogItem>,
    overlay: OwnershipOverlay,
    items: Vec<DisplayItem>,
    criteria: FilterCriteria,
    /// Positions into `items`, in display order
    visible: Vec<usize>,
    markers: Vec<MarkerGroup>,
    view: ViewMode,
    /// Cursor into `visible`
    detail: Option<usize>,
}

impl CollectionState {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn catalog(&self) -> &[CatalogItem] {
        &self.catalog
    }

    pub fn overlay(&self) -> &OwnershipOverlay {
        &self.overlay
    }

    /// Every catalog item with its ownership flag, catalog order
    pub fn items(&self) -> &[DisplayItem] {
        &self.items
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    /// Items passing the current filter, in display order
    pub fn visible_items(&self) -> Vec<&DisplayItem> {
        self.visible.iter().map(|&i| &self.items[i]).collect()
    }

    pub fn visible_len(&self) -> usize {
        self.visible.len()
    }

    pub fn visible_item(&self, position: usize) -> Option<&DisplayItem> {
        self.visible.get(position).map(|&i| &self.items[i])
    }

    /// Markers as of the last cluster pass (empty until the map is shown)
    pub fn markers(&self) -> &[MarkerGroup] {
        &self.markers
    }

    pub fn view(&self) -> ViewMode {
        self.view
    }

    pub fn owned_count(&self) -> usize {
        self.items.iter().filter(|d| d.owned).count()
    }

    pub fn progress(&self) -> Progress {
        let owned = self.owned_count();
        let total = self.items.len();
        let percentage = if total == 0 {
            0.0
        } else {
            owned as f64 * 100.0 / total as f64
        };
        Progress {
            owned,
            total,
            percentage,
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// New catalog from the service or an import
    pub fn replace_catalog(&mut self, catalog: Vec<CatalogItem>) {
        self.catalog = catalog;
        self.reconcile();
    }

    /// New overlay from storage, an import or a reset
    pub fn replace_overlay(&mut self, overlay: OwnershipOverlay) {
        self.overlay = overlay;
        self.reconcile();
    }

    pub fn set_criteria(&mut self, criteria: FilterCriteria) {
        self.criteria = criteria;
        self.refilter();
    }

    pub fn set_region(&mut self, region: Region) {
        self.criteria.region = region;
        self.refilter();
    }

    pub fn set_category(&mut self, category: CategoryFilter) {
        self.criteria.category = category;
        self.refilter();
    }

    pub fn set_status(&mut self, status: StatusFilter) {
        self.criteria.status = status;
        self.refilter();
    }

    /// Flip ownership of the visible item at `position`. The merged list is
    /// updated in place rather than rebuilt. Returns the new flag.
    pub fn toggle(&mut self, position: usize) -> Option<bool> {
        let idx = *self.visible.get(position)?;
        let owned = toggle_ownership(&mut self.items[idx], &mut self.overlay);
        debug!("Toggled {} -> {}", self.items[idx].key(), owned);
        self.refilter();
        Some(owned)
    }

    /// Show the map, building markers from the current visible list
    pub fn enter_map_view(&mut self) {
        self.view = ViewMode::Map;
        self.recluster();
    }

    pub fn enter_list_view(&mut self) {
        self.view = ViewMode::List;
    }

    // ========================================================================
    // Markers
    // ========================================================================

    /// Visible position behind `member` of marker `group`
    pub fn marker_member(&self, group: usize, member: usize) -> Option<usize> {
        self.markers.get(group)?.members.get(member).copied()
    }

    pub fn toggle_marker_member(&mut self, group: usize, member: usize) -> Option<bool> {
        let position = self.marker_member(group, member)?;
        self.toggle(position)
    }

    pub fn open_marker_member(&mut self, group: usize, member: usize) -> Option<DetailView> {
        let position = self.marker_member(group, member)?;
        self.open_detail(position)
    }

    // ========================================================================
    // Detail cursor
    // ========================================================================

    pub fn open_detail(&mut self, position: usize) -> Option<DetailView> {
        if position >= self.visible.len() {
            return None;
        }
        self.detail = Some(position);
        self.current_detail()
    }

    /// Step forward; stays on the last item
    pub fn next_detail(&mut self) -> Option<DetailView> {
        let position = self.detail?;
        if position + 1 < self.visible.len() {
            self.detail = Some(position + 1);
        }
        self.current_detail()
    }

    /// Step back; stays on the first item
    pub fn prev_detail(&mut self) -> Option<DetailView> {
        let position = self.detail?;
        self.detail = Some(position.saturating_sub(1));
        self.current_detail()
    }

    pub fn close_detail(&mut self) {
        self.detail = None;
    }

    pub fn current_detail(&self) -> Option<DetailView> {
        let position = self.detail?;
        let item = self.visible_item(position)?;
        Some(DetailView {
            position,
            total: self.visible.len(),
            image: item.image_url().map(str::to_string),
            glyph: item.glyph().to_string(),
            title: item.name.clone(),
            subtitle: format!("{} | {}", item.region, item.category),
            owned: item.owned,
        })
    }

    /// Toggle the item under the detail cursor
    pub fn toggle_detail(&mut self) -> Option<bool> {
        let position = self.detail?;
        self.toggle(position)
    }

    // ========================================================================
    // Derivations
    // ========================================================================

    fn reconcile(&mut self) {
        self.items = merge(&self.catalog, &self.overlay);
        debug!(
            "Reconciled {} items against {} overlay entries",
            self.items.len(),
            self.overlay.len()
        );
        // Positions from the old list mean nothing now
        self.detail = None;
        self.refilter();
    }

    fn refilter(&mut self) {
        let focused = self
            .detail
            .and_then(|position| self.visible.get(position).copied());

        self.visible = filter_indices(&self.items, &self.criteria);

        // Keep the cursor on the same item when it is still visible
        self.detail = match (self.detail, focused) {
            (_, Some(idx)) if self.visible.contains(&idx) => {
                self.visible.iter().position(|&i| i == idx)
            }
            (Some(_), _) if self.visible.is_empty() => None,
            (Some(position), _) => Some(position.min(self.visible.len() - 1)),
            (None, _) => None,
        };

        if self.view == ViewMode::Map {
            self.recluster();
        }
    }

    fn recluster(&mut self) {
        let markers = {
            let visible = self.visible_items();
            build_markers(&visible)
        };
        debug!("Built {} markers from {} items", markers.len(), self.visible.len());
        self.markers = markers;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{MarkerContent, OwnershipState};
    use crate::types::Category;

    fn item(id: u64, name: &str, image: Option<&str>, region: Region, lat: f64) -> CatalogItem {
        CatalogItem {
            id,
            name: name.to_string(),
            image: image.map(str::to_string),
            emoji: String::new(),
            category: Category::Tag,
            region,
            lat: Some(lat),
            lng: Some(139.0),
            search_location: None,
            extra: Default::default(),
        }
    }

    fn sample() -> CollectionState {
        let mut state = CollectionState::new();
        state.replace_catalog(vec![
            item(1, "A", Some("a/x.png"), Region::Kanto, 35.0),
            item(2, "B", Some("b/y.png"), Region::Kanto, 36.0),
            item(3, "C", None, Region::Kyushu, 33.0),
        ]);
        state
    }

    fn names(state: &CollectionState) -> Vec<String> {
        state.visible_items().iter().map(|d| d.name.clone()).collect()
    }

    #[test]
    fn test_scenario_end_to_end() {
        let mut state = CollectionState::new();
        let catalog: Vec<CatalogItem> = serde_json::from_value(serde_json::json!([
            {"id": 1, "name": "A", "image": "a/x.png", "lat": 35, "lng": 139, "region": "關東", "category": "tag"}
        ]))
        .unwrap();
        state.replace_catalog(catalog);
        state.replace_overlay([("x.png".to_string(), true)].into_iter().collect());
        assert!(state.items()[0].owned);

        state.set_criteria(FilterCriteria {
            region: Region::parse("關東"),
            category: CategoryFilter::parse("all"),
            status: StatusFilter::parse("owned"),
        });
        assert_eq!(names(&state), vec!["A"]);

        state.enter_map_view();
        let markers = state.markers();
        assert_eq!(markers.len(), 1);
        assert_eq!((markers[0].lat, markers[0].lng), (35.0, 139.0));
        assert_eq!(markers[0].state, OwnershipState::AllOwned);
    }

    #[test]
    fn test_toggle_updates_overlay_and_refilters() {
        let mut state = sample();
        state.set_status(StatusFilter::NotOwned);
        assert_eq!(names(&state), vec!["A", "B", "C"]);

        assert_eq!(state.toggle(1), Some(true));
        assert!(state.overlay().is_owned("y.png"));
        assert_eq!(names(&state), vec!["A", "C"]);
        assert_eq!(state.owned_count(), 1);
    }

    #[test]
    fn test_toggle_out_of_range_is_none() {
        let mut state = sample();
        assert_eq!(state.toggle(9), None);
        assert!(state.overlay().is_empty());
    }

    #[test]
    fn test_markers_only_built_once_map_is_shown() {
        let mut state = sample();
        assert!(state.markers().is_empty());

        state.enter_map_view();
        assert_eq!(state.markers().len(), 3);

        state.set_region(Region::Kyushu);
        assert_eq!(state.markers().len(), 1);
        assert_eq!(state.markers()[0].content, MarkerContent::Emoji("🏷️".into()));
    }

    #[test]
    fn test_marker_toggle_reaches_the_list_item() {
        let mut state = sample();
        state.enter_map_view();
        let group = state
            .markers()
            .iter()
            .position(|m| m.label == "九州")
            .unwrap();

        assert_eq!(state.toggle_marker_member(group, 0), Some(true));
        assert!(state.items()[2].owned);
        assert!(state.overlay().is_owned("C"));
        assert_eq!(state.toggle_marker_member(group, 5), None);
    }

    #[test]
    fn test_marker_member_opens_detail() {
        let mut state = sample();
        state.enter_map_view();
        let group = state
            .markers()
            .iter()
            .position(|m| m.label == "九州")
            .unwrap();

        let view = state.open_marker_member(group, 0).unwrap();
        assert_eq!((view.position, view.title.as_str()), (2, "C"));
        assert_eq!(state.toggle_detail(), Some(true));
        assert!(state.overlay().is_owned("C"));
        assert!(state.open_marker_member(group, 1).is_none());
        assert!(state.open_marker_member(99, 0).is_none());
    }

    #[test]
    fn test_list_view_leaves_markers_stale() {
        let mut state = sample();
        state.enter_map_view();
        assert_eq!(state.markers().len(), 3);

        state.enter_list_view();
        assert_eq!(state.view(), ViewMode::List);
        state.set_region(Region::Kyushu);
        assert_eq!(state.visible_len(), 1);
        assert_eq!(state.markers().len(), 3);

        state.enter_map_view();
        assert_eq!(state.markers().len(), 1);
    }

    #[test]
    fn test_overlay_replace_rederives() {
        let mut state = sample();
        state.enter_map_view();
        state.replace_overlay(
            [("x.png".to_string(), true), ("y.png".to_string(), true)]
                .into_iter()
                .collect(),
        );
        assert_eq!(state.owned_count(), 2);
        let owned_markers = state
            .markers()
            .iter()
            .filter(|m| m.state == OwnershipState::AllOwned)
            .count();
        assert_eq!(owned_markers, 2);
    }

    #[test]
    fn test_detail_navigation_is_bounded() {
        let mut state = sample();
        assert!(state.next_detail().is_none());

        let view = state.open_detail(0).unwrap();
        assert_eq!(view.title, "A");
        assert_eq!(view.subtitle, "關東 | tag");
        assert_eq!(view.image.as_deref(), Some("a/x.png"));

        assert!(state.prev_detail().is_some());
        assert_eq!(state.current_detail().unwrap().position, 0);

        state.next_detail();
        let last = state.next_detail().unwrap();
        assert_eq!(last.title, "C");
        assert_eq!(state.next_detail().unwrap().title, "C");

        state.close_detail();
        assert!(state.current_detail().is_none());
        assert!(state.open_detail(3).is_none());
    }

    #[test]
    fn test_detail_follows_item_across_refilter() {
        let mut state = sample();
        state.open_detail(2);
        state.set_region(Region::Kyushu);
        let view = state.current_detail().unwrap();
        assert_eq!((view.position, view.title.as_str()), (0, "C"));
    }

    #[test]
    fn test_detail_toggle_when_item_leaves_filter() {
        let mut state = sample();
        state.set_status(StatusFilter::NotOwned);
        state.open_detail(1);
        assert_eq!(state.toggle_detail(), Some(true));

        // B is now owned and filtered out; cursor stays at the same slot
        let view = state.current_detail().unwrap();
        assert_eq!(view.title, "C");
        assert!(!view.owned);
    }

    #[test]
    fn test_progress() {
        let mut state = CollectionState::new();
        assert_eq!(state.progress().percentage, 0.0);

        state = sample();
        state.toggle(0);
        let progress = state.progress();
        assert_eq!((progress.owned, progress.total), (1, 3));
        assert!((progress.percentage - 33.333).abs() < 0.01);
    }

    #[test]
    fn test_catalog_replace_keeps_ownership_by_key() {
        let mut state = sample();
        state.toggle(0);
        state.replace_catalog(vec![item(10, "A renamed", Some("new/x.png"), Region::Kanto, 35.0)]);
        assert!(state.items()[0].owned);
        assert_eq!(state.visible_len(), 1);
    }
}
