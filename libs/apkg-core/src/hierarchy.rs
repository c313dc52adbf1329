//! Deck hierarchy derived from `::` names.
//!
//! Decks are stored flat, keyed by full path. Parent and child relations are
//! computed from the names when asked for; a parent path need not exist as a
//! deck of its own.

use std::collections::BTreeMap;

use crate::types::{ParsedDeck, DECK_PATH_SEPARATOR};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeckHierarchy {
    by_path: BTreeMap<String, Vec<i64>>,
}

impl DeckHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_decks(decks: &[ParsedDeck]) -> Self {
        let mut hierarchy = Self::new();
        for deck in decks {
            hierarchy.insert(&deck.name, deck.id);
        }
        hierarchy
    }

    /// Deck names are not unique, so one path may carry several ids.
    pub fn insert(&mut self, path: &str, id: i64) {
        self.by_path.entry(path.to_string()).or_default().push(id);
    }

    pub fn ids(&self, path: &str) -> &[i64] {
        self.by_path.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, path: &str) -> bool {
        self.by_path.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.by_path.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Direct children among the stored paths, in name order.
    pub fn children_of<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.paths().filter(move |p| parent_of(p) == Some(path))
    }

    /// Stored paths whose parent path is not stored.
    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.paths()
            .filter(move |p| parent_of(p).map_or(true, |parent| !self.contains(parent)))
    }

    /// Closest stored ancestor of `path`.
    pub fn nearest_ancestor<'a>(&self, path: &'a str) -> Option<&'a str> {
        ancestors(path).find(|a| self.contains(a))
    }
}

/// Parent path of `path`, or `None` for a top-level deck.
pub fn parent_of(path: &str) -> Option<&str> {
    path.rsplit_once(DECK_PATH_SEPARATOR).map(|(parent, _)| parent)
}

/// Ancestor paths from the immediate parent up to the top-level deck.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(parent_of(path), |p| parent_of(*p))
}
