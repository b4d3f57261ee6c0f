//! ============================================================================
//! Spatial Clustering - Map markers from the visible item list
//! ============================================================================
//! Items whose coordinates agree to 5 decimal places (~1 m) share one
//! marker. Airport/flight-themed items from the "other" bucket are sold at
//! every major airport, so they are placed on all twelve airport markers.
//!
//! Groups hold positions into the filtered list rather than copies, so a
//! toggle or detail view opened from a marker acts on the same item the
//! list shows.
//! ============================================================================

use serde::Serialize;
use std::borrow::Borrow;
use std::collections::HashMap;

use crate::types::{DisplayItem, Region};

/// Decimal places kept when coalescing coordinates
pub const COORD_PRECISION: i32 = 5;

/// Substrings marking an item as airport/flight themed
pub const AIRPORT_KEYWORDS: [&str; 5] = ["空港", "パイロット", "飛行機", "CA", "エアポート"];

/// Suffix appended to airport marker labels
const AIRPORT_LABEL_SUFFIX: &str = "(全日本機場)";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Airport {
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
}

pub const MAJOR_AIRPORTS: [Airport; 12] = [
    Airport { name: "新千歲空港", lat: 42.7934, lng: 141.6923 },
    Airport { name: "函館空港", lat: 41.7704, lng: 140.8222 },
    Airport { name: "仙台空港", lat: 38.1398, lng: 140.9169 },
    Airport { name: "羽田空港", lat: 35.5494, lng: 139.7798 },
    Airport { name: "成田空港", lat: 35.7720, lng: 140.3929 },
    Airport { name: "中部國際空港", lat: 34.8584, lng: 136.8053 },
    Airport { name: "伊丹空港", lat: 34.7855, lng: 135.4382 },
    Airport { name: "關西國際空港", lat: 34.4320, lng: 135.2304 },
    Airport { name: "廣島空港", lat: 34.4398, lng: 132.9195 },
    Airport { name: "福岡空港", lat: 33.5859, lng: 130.4507 },
    Airport { name: "鹿兒島空港", lat: 31.8035, lng: 130.7196 },
    Airport { name: "那霸空港", lat: 26.2048, lng: 127.6458 },
];

/// Aggregate ownership of a marker's members
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OwnershipState {
    AllOwned,
    SomeOwned,
    NoneOwned,
}

impl OwnershipState {
    pub fn from_flags(flags: impl IntoIterator<Item = bool>) -> Self {
        let (mut owned, mut total) = (0usize, 0usize);
        for flag in flags {
            total += 1;
            if flag {
                owned += 1;
            }
        }
        if total > 0 && owned == total {
            Self::AllOwned
        } else if owned > 0 {
            Self::SomeOwned
        } else {
            Self::NoneOwned
        }
    }

    /// Pin color
    pub fn color(&self) -> &'static str {
        match self {
            Self::AllOwned => "#4ade80",
            Self::SomeOwned => "#facc15",
            Self::NoneOwned => "#ffb7ce",
        }
    }
}

/// What the pin itself shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MarkerContent {
    Image(String),
    Emoji(String),
    Count(usize),
}

/// One map pin
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerGroup {
    /// Position of the first member placed in this group
    pub lat: f64,
    pub lng: f64,
    pub label: String,
    /// Positions into the filtered list, in insertion order
    pub members: Vec<usize>,
    pub state: OwnershipState,
    pub content: MarkerContent,
}

impl MarkerGroup {
    /// Resolve members against the filtered list they were built from
    pub fn member_items<'a, T: Borrow<DisplayItem>>(
        &'a self,
        filtered: &'a [T],
    ) -> impl Iterator<Item = (usize, &'a DisplayItem)> + 'a {
        self.members
            .iter()
            .filter_map(move |&idx| filtered.get(idx).map(|item| (idx, item.borrow())))
    }
}

/// Whether an item is fanned out across all airports
pub fn is_airport_item(item: &DisplayItem) -> bool {
    item.region == Region::Other && AIRPORT_KEYWORDS.iter().any(|kw| item.name.contains(kw))
}

fn coord_key(lat: f64, lng: f64) -> (i64, i64) {
    let scale = 10f64.powi(COORD_PRECISION);
    ((lat * scale).round() as i64, (lng * scale).round() as i64)
}

struct Pending {
    lat: f64,
    lng: f64,
    label: String,
    members: Vec<usize>,
}

/// Group the filtered items into markers. Groups come out in the order
/// their first member was placed. Items without coordinates are skipped
/// unless they are fanned out to the airports.
pub fn build_markers<T: Borrow<DisplayItem>>(filtered: &[T]) -> Vec<MarkerGroup> {
    let mut groups: Vec<Pending> = Vec::new();
    let mut by_key: HashMap<(i64, i64), usize> = HashMap::new();

    let mut place = |lat: f64, lng: f64, idx: usize, label: &dyn Fn() -> String| {
        let slot = *by_key.entry(coord_key(lat, lng)).or_insert_with(|| {
            groups.push(Pending {
                lat,
                lng,
                label: label(),
                members: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].members.push(idx);
    };

    for (idx, item) in filtered.iter().enumerate() {
        let item = item.borrow();
        if is_airport_item(item) {
            for airport in &MAJOR_AIRPORTS {
                place(airport.lat, airport.lng, idx, &|| {
                    format!("{} {}", airport.name, AIRPORT_LABEL_SUFFIX)
                });
            }
        } else if let Some((lat, lng)) = item.coords() {
            place(lat, lng, idx, &|| item.location_label());
        } else {
            tracing::debug!("Skipping unlocated item {} ({})", item.id, item.name);
        }
    }

    groups
        .into_iter()
        .map(|g| {
            let state = OwnershipState::from_flags(
                g.members.iter().map(|&i| filtered[i].borrow().owned),
            );
            let content = match g.members.as_slice() {
                [only] => {
                    let item = filtered[*only].borrow();
                    match item.image_url() {
                        Some(url) => MarkerContent::Image(url.to_string()),
                        None => MarkerContent::Emoji(item.glyph().to_string()),
                    }
                }
                many => MarkerContent::Count(many.len()),
            };
            MarkerGroup {
                lat: g.lat,
                lng: g.lng,
                label: g.label,
                members: g.members,
                state,
                content,
            }
        })
        .collect()
}
