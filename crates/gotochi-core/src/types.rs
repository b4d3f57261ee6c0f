//! ============================================================================
//! Core Types for the Gotochi Tracker
//! ============================================================================
//! Catalog records, the per-user ownership overlay, merged display items and
//! the crate-wide error type. Catalog and overlay types are serialized to the
//! same JSON shapes the catalog service and the save file use.
//! ============================================================================

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Region / Category
// ============================================================================

/// Geographic bucket an item is sold in.
/// `All` is the filter sentinel ("全部") and never a real item region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Region {
    All,
    Hokkaido,
    Tohoku,
    Kanto,
    Chubu,
    Kinki,
    Chugoku,
    Shikoku,
    Kyushu,
    Okinawa,
    Overseas,
    Other,
    /// A region label the catalog carries that is not one of the fixed buckets.
    /// Kept verbatim so exports do not rewrite catalog data.
    Unlisted(String),
}

impl Region {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "全部" => Self::All,
            "北海道" => Self::Hokkaido,
            "東北" => Self::Tohoku,
            "關東" => Self::Kanto,
            "中部" => Self::Chubu,
            "近畿" => Self::Kinki,
            "中國" => Self::Chugoku,
            "四國" => Self::Shikoku,
            "九州" => Self::Kyushu,
            "沖繩" => Self::Okinawa,
            "海外" => Self::Overseas,
            "其他" => Self::Other,
            other => Self::Unlisted(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::All => "全部",
            Self::Hokkaido => "北海道",
            Self::Tohoku => "東北",
            Self::Kanto => "關東",
            Self::Chubu => "中部",
            Self::Kinki => "近畿",
            Self::Chugoku => "中國",
            Self::Shikoku => "四國",
            Self::Kyushu => "九州",
            Self::Okinawa => "沖繩",
            Self::Overseas => "海外",
            Self::Other => "其他",
            Self::Unlisted(s) => s,
        }
    }
}

impl Default for Region {
    fn default() -> Self {
        Self::Other
    }
}

impl From<String> for Region {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<Region> for String {
    fn from(r: Region) -> Self {
        r.as_str().to_string()
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Product category. Unknown labels collapse into `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Tag,
    Plush,
    Socks,
    Other,
}

impl Category {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "tag" => Self::Tag,
            "plush" => Self::Plush,
            "socks" => Self::Socks,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tag => "tag",
            Self::Plush => "plush",
            Self::Socks => "socks",
            Self::Other => "other",
        }
    }

    /// Human-facing label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Tag => "鐵牌",
            Self::Plush => "娃娃",
            Self::Socks => "襪子",
            Self::Other => "其他",
        }
    }

    /// Fallback glyph for items without an image or explicit emoji
    pub fn default_emoji(&self) -> &'static str {
        match self {
            Self::Plush => "🧸",
            Self::Tag => "🏷️",
            Self::Socks => "🧦",
            Self::Other => "✨",
        }
    }
}

impl Default for Category {
    fn default() -> Self {
        Self::Other
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        c.as_str().to_string()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// One record of the shared public catalog.
/// Fields the tracker does not interpret are carried in `extra` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    #[serde(default)]
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub emoji: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub region: Region,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_location: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CatalogItem {
    /// Join key into the ownership overlay
    pub fn key(&self) -> String {
        item_key(self.image.as_deref(), &self.name)
    }

    /// Image URL, if the record has a non-empty one
    pub fn image_url(&self) -> Option<&str> {
        self.image.as_deref().filter(|s| !s.is_empty())
    }

    /// Emoji to show when there is no image
    pub fn glyph(&self) -> &str {
        if self.emoji.is_empty() {
            self.category.default_emoji()
        } else {
            &self.emoji
        }
    }

    /// Coordinates, when both halves are present
    pub fn coords(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => Some((lat, lng)),
            _ => None,
        }
    }

    /// Map label: the search location override, else the region name
    pub fn location_label(&self) -> String {
        match self.search_location.as_deref().map(str::trim) {
            Some(loc) if !loc.is_empty() => loc.to_string(),
            _ => self.region.to_string(),
        }
    }
}

/// Item key: last path segment of the image URL, falling back to the name
/// when there is no image or the URL ends in a slash.
pub fn item_key(image: Option<&str>, name: &str) -> String {
    image
        .and_then(|img| img.rsplit('/').next())
        .filter(|seg| !seg.is_empty())
        .unwrap_or(name)
        .to_string()
}

// ============================================================================
// Ownership overlay
// ============================================================================

/// Per-item ownership record in the overlay.
///
/// Entries are read leniently: anything that is not an object with a boolean
/// (or missing) `owned` field counts as not owned and is written back exactly
/// as it was read. Extra fields on well-formed entries are carried along.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnershipEntry {
    pub owned: bool,
    pub extra: Map<String, Value>,
    unreadable: Option<Value>,
}

impl OwnershipEntry {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut fields) => {
                if !matches!(fields.get("owned"), None | Some(Value::Bool(_))) {
                    return Self {
                        unreadable: Some(Value::Object(fields)),
                        ..Self::default()
                    };
                }
                let owned = fields
                    .remove("owned")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                Self {
                    owned,
                    extra: fields,
                    unreadable: None,
                }
            }
            other => Self {
                unreadable: Some(other),
                ..Self::default()
            },
        }
    }

    /// True when the stored value could not be read as an entry
    pub fn is_unreadable(&self) -> bool {
        self.unreadable.is_some()
    }

    fn set(&mut self, owned: bool) {
        // An object with a bad `owned` keeps its other fields once rewritten
        if let Some(Value::Object(mut fields)) = self.unreadable.take() {
            fields.remove("owned");
            self.extra = fields;
        }
        self.owned = owned;
    }
}

impl Serialize for OwnershipEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if let Some(raw) = &self.unreadable {
            return raw.serialize(serializer);
        }
        let mut map = serializer.serialize_map(Some(self.extra.len() + 1))?;
        map.serialize_entry("owned", &self.owned)?;
        for (k, v) in &self.extra {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for OwnershipEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

/// Item key -> ownership. Serialized as a plain JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnershipOverlay(BTreeMap<String, OwnershipEntry>);

impl OwnershipOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Owned flag for a key; absent keys are not owned
    pub fn is_owned(&self, key: &str) -> bool {
        self.0.get(key).map(|e| e.owned).unwrap_or(false)
    }

    pub fn set_owned(&mut self, key: impl Into<String>, owned: bool) {
        self.0.entry(key.into()).or_default().set(owned);
    }

    pub fn get(&self, key: &str) -> Option<&OwnershipEntry> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn owned_count(&self) -> usize {
        self.0.values().filter(|e| e.owned).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OwnershipEntry)> {
        self.0.iter()
    }

    /// Parse overlay JSON. Only input that is not a JSON object yields an
    /// empty overlay; bad entries inside an object are kept as unreadable.
    pub fn from_json_lossy(raw: &str) -> Self {
        match serde_json::from_str(raw) {
            Ok(overlay) => overlay,
            Err(e) => {
                tracing::warn!("Discarding malformed ownership overlay: {}", e);
                Self::default()
            }
        }
    }
}

impl FromIterator<(String, bool)> for OwnershipOverlay {
    fn from_iter<I: IntoIterator<Item = (String, bool)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, owned)| {
                    (
                        k,
                        OwnershipEntry {
                            owned,
                            ..OwnershipEntry::default()
                        },
                    )
                })
                .collect(),
        )
    }
}

// ============================================================================
// Display item
// ============================================================================

/// Catalog item joined with its ownership flag. Always derived, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayItem {
    #[serde(flatten)]
    pub item: CatalogItem,
    pub owned: bool,
}

impl std::ops::Deref for DisplayItem {
    type Target = CatalogItem;

    fn deref(&self) -> &CatalogItem {
        &self.item
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error types for the tracker core
#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    #[error("Local storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Remote store error ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Catalog service error: {0}")]
    Catalog(String),

    #[error("Not signed in")]
    NotAuthenticated,

    #[error("No remote folder selected")]
    NoFolderSelected,

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for CollectionError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::Remote {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None => Self::Network(e.to_string()),
        }
    }
}

pub type CollectionResult<T> = std::result::Result<T, CollectionError>;
