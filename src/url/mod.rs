//! URL handling module for Dict-Harvester
//!
//! This module maps URLs onto the three tiers of the dictionary hierarchy and
//! provides the small string helpers the resume logic needs.
//!
//! The level rule is a positional heuristic over URL shape and is kept exact:
//!
//! | Condition                                   | Level    |
//! |---------------------------------------------|----------|
//! | some `/`-segment equals `browse`            | `First`  |
//! | `/`-segment count equals 8                  | `Second` |
//! | anything else                               | `Word`   |
//!
//! It does not look at page content and has only been checked against the
//! shape of the dictionary site it was written for.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Number of `/`-separated segments that identifies a second-level URL
///
/// `https://host/browse/dict/a/a-range/` style URLs split into 8 parts.
pub const SECOND_LEVEL_SEGMENTS: usize = 8;

/// Hierarchy tier of a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    /// Browse index listing one link per letter
    First,
    /// Per-letter range listing
    Second,
    /// Leaf word page
    Word,
}

impl Level {
    /// Returns all levels in hierarchy order
    pub fn all() -> [Self; 3] {
        [Self::First, Self::Second, Self::Word]
    }

    /// Short name used in logs and on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::First => "first",
            Self::Second => "second",
            Self::Word => "word",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a URL into its hierarchy level using the default segment count
///
/// # Examples
///
/// ```
/// use dict_harvester::url::{classify, Level};
///
/// assert_eq!(
///     classify("https://dictionary.example.org/browse/english/a/"),
///     Level::First
/// );
/// assert_eq!(
///     classify("https://dictionary.example.org/dict/english/a/a-range/"),
///     Level::Second
/// );
/// assert_eq!(
///     classify("https://dictionary.example.org/dict/english/apple"),
///     Level::Word
/// );
/// ```
pub fn classify(url: &str) -> Level {
    classify_with(url, SECOND_LEVEL_SEGMENTS)
}

/// Classifies a URL with an explicit second-level segment count
pub fn classify_with(url: &str, second_level_segments: usize) -> Level {
    let parts: Vec<&str> = url.split('/').collect();

    if parts.iter().any(|p| *p == "browse") {
        Level::First
    } else if parts.len() == second_level_segments {
        Level::Second
    } else {
        Level::Word
    }
}

/// Returns the letter segment of a first-level URL
///
/// This is the second-to-last `/`-segment, so `…/browse/english/b/` yields
/// `"b"`. Returns `None` when the URL has fewer than two segments or the
/// segment is empty.
pub fn letter_segment(url: &str) -> Option<&str> {
    let parts: Vec<&str> = url.split('/').collect();
    if parts.len() < 2 {
        return None;
    }
    let segment = parts[parts.len() - 2];
    (!segment.is_empty()).then_some(segment)
}

/// Resolves a link found on `base` into an absolute URL
///
/// Returns `None` if either side fails to parse.
pub fn resolve_link(base: &str, href: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    base.join(href).ok().map(String::from)
}
