//! Visible-subset predicates (region AND category AND ownership status).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Category, DisplayItem, Region};

/// Category predicate; `All` is the "all" sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "all" | "" => Self::All,
            other => Self::Only(Category::parse(other)),
        }
    }

    pub fn matches(&self, category: Category) -> bool {
        match self {
            Self::All => true,
            Self::Only(c) => *c == category,
        }
    }
}

impl fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Only(c) => write!(f, "{}", c),
        }
    }
}

/// Ownership predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StatusFilter {
    #[default]
    All,
    Owned,
    NotOwned,
}

impl StatusFilter {
    /// "all" and "owned" are recognised; any other value means not owned
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "all" => Self::All,
            "owned" => Self::Owned,
            _ => Self::NotOwned,
        }
    }

    pub fn matches(&self, owned: bool) -> bool {
        match self {
            Self::All => true,
            Self::Owned => owned,
            Self::NotOwned => !owned,
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::All => "all",
            Self::Owned => "owned",
            Self::NotOwned => "not-owned",
        })
    }
}

/// The three filter criteria. Defaults match everything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub region: Region,
    pub category: CategoryFilter,
    pub status: StatusFilter,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            region: Region::All,
            category: CategoryFilter::All,
            status: StatusFilter::All,
        }
    }
}

impl FilterCriteria {
    pub fn matches(&self, item: &DisplayItem) -> bool {
        let region_ok = self.region == Region::All || item.region == self.region;
        region_ok && self.category.matches(item.category) && self.status.matches(item.owned)
    }
}

/// Matching items, in input order
pub fn filter<'a>(items: &'a [DisplayItem], criteria: &FilterCriteria) -> Vec<&'a DisplayItem> {
    items.iter().filter(|item| criteria.matches(item)).collect()
}

/// Positions of matching items within `items`
pub fn filter_indices(items: &[DisplayItem], criteria: &FilterCriteria) -> Vec<usize> {
    items
        .iter()
        .enumerate()
        .filter(|(_, item)| criteria.matches(item))
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CatalogItem;

    fn display(name: &str, region: Region, category: Category, owned: bool) -> DisplayItem {
        DisplayItem {
            item: CatalogItem {
                id: 0,
                name: name.to_string(),
                image: None,
                emoji: String::new(),
                category,
                region,
                lat: None,
                lng: None,
                search_location: None,
                extra: Default::default(),
            },
            owned,
        }
    }

    fn sample() -> Vec<DisplayItem> {
        vec![
            display("a", Region::Kanto, Category::Tag, true),
            display("b", Region::Kanto, Category::Plush, false),
            display("c", Region::Kyushu, Category::Tag, false),
            display("d", Region::Other, Category::Socks, true),
        ]
    }

    fn names(items: &[&DisplayItem]) -> Vec<String> {
        items.iter().map(|d| d.name.clone()).collect()
    }

    #[test]
    fn test_all_wildcards_is_identity() {
        let items = sample();
        let out = filter(&items, &FilterCriteria::default());
        assert_eq!(out.len(), items.len());
        assert!(out.iter().zip(items.iter()).all(|(a, b)| *a == b));
        assert_eq!(filter_indices(&items, &FilterCriteria::default()), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_predicates_are_anded() {
        let items = sample();
        let criteria = FilterCriteria {
            region: Region::Kanto,
            category: CategoryFilter::Only(Category::Tag),
            status: StatusFilter::All,
        };
        assert_eq!(names(&filter(&items, &criteria)), vec!["a"]);
    }

    #[test]
    fn test_status_filters() {
        let items = sample();
        let owned = FilterCriteria {
            status: StatusFilter::Owned,
            ..Default::default()
        };
        assert_eq!(names(&filter(&items, &owned)), vec!["a", "d"]);
        let not_owned = FilterCriteria {
            status: StatusFilter::NotOwned,
            ..Default::default()
        };
        assert_eq!(names(&filter(&items, &not_owned)), vec!["b", "c"]);
    }

    #[test]
    fn test_unknown_status_means_not_owned() {
        assert_eq!(StatusFilter::parse("unowned"), StatusFilter::NotOwned);
        assert_eq!(StatusFilter::parse("whatever"), StatusFilter::NotOwned);
        assert_eq!(StatusFilter::parse("owned"), StatusFilter::Owned);
        assert_eq!(StatusFilter::parse("all"), StatusFilter::All);
    }

    #[test]
    fn test_category_filter_parse() {
        assert_eq!(CategoryFilter::parse("all"), CategoryFilter::All);
        assert_eq!(CategoryFilter::parse("socks"), CategoryFilter::Only(Category::Socks));
    }

    #[test]
    fn test_scenario_region_owned() {
        let items = vec![display("A", Region::Kanto, Category::Tag, true)];
        let criteria = FilterCriteria {
            region: Region::parse("關東"),
            category: CategoryFilter::parse("all"),
            status: StatusFilter::parse("owned"),
        };
        assert_eq!(names(&filter(&items, &criteria)), vec!["A"]);
    }
}
