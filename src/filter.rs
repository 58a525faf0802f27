use std::{cmp::Reverse, collections::HashSet};

use serde::{Deserialize, Serialize};
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use crate::models::{DifficultyLevel, Event, FilterOptions, SortOrder};

/// User-selected criteria. Fields combine with AND; an empty field imposes
/// no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub search: String,
    pub city: Option<String>,
    pub level: Option<DifficultyLevel>,
    pub sort: SortOrder,
}

impl FilterCriteria {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, event: &Event) -> bool {
        self.matches_needle(&self.search.to_lowercase(), event)
    }

    /// `needle` is the search text, already lowercased.
    fn matches_needle(&self, needle: &str, event: &Event) -> bool {
        if !needle.is_empty() && !event.name.to_lowercase().contains(needle) {
            return false;
        }
        if let Some(city) = &self.city {
            if event.city != *city {
                return false;
            }
        }
        if let Some(level) = self.level {
            if event.level != level {
                return false;
            }
        }
        true
    }
}

/// Keeps the events matching every set criterion, then sorts them stably
/// by name.
pub fn apply_filters(events: &[Event], criteria: &FilterCriteria) -> Vec<Event> {
    let needle = criteria.search.to_lowercase();
    let mut filtered: Vec<Event> = events
        .iter()
        .filter(|event| criteria.matches_needle(&needle, event))
        .cloned()
        .collect();

    // sort_by_cached_key is stable, so equal names keep their input order in
    // both directions.
    match criteria.sort {
        SortOrder::Asc => filtered.sort_by_cached_key(|event| CollationKey::new(&event.name)),
        SortOrder::Desc => {
            filtered.sort_by_cached_key(|event| Reverse(CollationKey::new(&event.name)))
        }
    }
    filtered
}

/// Distinct cities and levels in first-seen order.
pub fn derive_filter_options(events: &[Event]) -> FilterOptions {
    let mut seen_cities: HashSet<&str> = HashSet::new();
    let mut seen_levels: HashSet<DifficultyLevel> = HashSet::new();
    let mut options = FilterOptions::default();

    for event in events {
        if seen_cities.insert(event.city.as_str()) {
            options.cities.push(event.city.clone());
        }
        if seen_levels.insert(event.level) {
            options.levels.push(event.level);
        }
    }
    options
}

/// Orders events by scheduled date, earliest first. Stable.
pub fn sort_by_date(mut events: Vec<Event>) -> Vec<Event> {
    events.sort_by_key(|event| event.date);
    events
}

/// Ordering key approximating locale collation: base letters first, then
/// accents, then case with lowercase ahead of uppercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CollationKey {
    primary: String,
    secondary: String,
    tertiary: Vec<(bool, char)>,
}

impl CollationKey {
    pub fn new(text: &str) -> Self {
        let secondary: String = text.nfd().flat_map(char::to_lowercase).collect();
        let primary = secondary.chars().filter(|c| !is_combining_mark(*c)).collect();
        Self {
            primary,
            secondary,
            tertiary: text.nfd().map(|c| (c.is_uppercase(), c)).collect(),
        }
    }
}

pub fn compare_names(a: &str, b: &str) -> std::cmp::Ordering {
    CollationKey::new(a).cmp(&CollationKey::new(b))
}
