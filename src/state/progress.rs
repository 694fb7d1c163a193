use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resumption cursor for a crawl run
///
/// Persisted as `progress.json` after every mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCursor {
    /// Expected number of words, when the engine reports it
    #[serde(default)]
    pub total_words: u64,

    /// Number of accepted records so far
    #[serde(default)]
    pub processed_words: u64,

    /// Letter currently being crawled; resumption starts here
    #[serde(default)]
    pub current_letter: Option<String>,

    pub start_time: DateTime<Utc>,

    pub last_update: DateTime<Utc>,
}

impl ProgressCursor {
    /// Creates a cursor for a run starting now
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            total_words: 0,
            processed_words: 0,
            current_letter: None,
            start_time: now,
            last_update: now,
        }
    }

    /// Merges the provided fields into the cursor and bumps `last_update`
    ///
    /// An empty letter is ignored, matching "no letter given".
    pub fn merge(
        &mut self,
        letter: Option<&str>,
        processed_words: Option<u64>,
        total_words: Option<u64>,
    ) {
        if let Some(letter) = letter.filter(|l| !l.is_empty()) {
            self.current_letter = Some(letter.to_string());
        }
        if let Some(processed) = processed_words {
            self.processed_words = processed;
        }
        if let Some(total) = total_words {
            self.total_words = total;
        }
        self.touch();
    }

    pub fn touch(&mut self) {
        self.last_update = Utc::now();
    }

    /// Fraction of `total_words` processed, if a total is known
    pub fn completion(&self) -> Option<f64> {
        (self.total_words > 0).then(|| self.processed_words as f64 / self.total_words as f64)
    }
}

impl Default for ProgressCursor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_cursor_is_empty() {
        let cursor = ProgressCursor::new();
        assert_eq!(cursor.total_words, 0);
        assert_eq!(cursor.processed_words, 0);
        assert!(cursor.current_letter.is_none());
        assert_eq!(cursor.start_time, cursor.last_update);
    }

    #[test]
    fn test_merge_only_touches_given_fields() {
        let mut cursor = ProgressCursor::new();
        cursor.merge(Some("c"), None, None);
        assert_eq!(cursor.current_letter.as_deref(), Some("c"));
        assert_eq!(cursor.processed_words, 0);

        cursor.merge(None, Some(12), Some(40));
        assert_eq!(cursor.current_letter.as_deref(), Some("c"));
        assert_eq!(cursor.processed_words, 12);
        assert_eq!(cursor.total_words, 40);
        assert!(cursor.last_update >= cursor.start_time);
    }

    #[test]
    fn test_empty_letter_is_ignored() {
        let mut cursor = ProgressCursor::new();
        cursor.merge(Some("d"), None, None);
        cursor.merge(Some(""), None, None);
        assert_eq!(cursor.current_letter.as_deref(), Some("d"));
    }

    #[test]
    fn test_completion() {
        let mut cursor = ProgressCursor::new();
        assert_eq!(cursor.completion(), None);
        cursor.merge(None, Some(25), Some(100));
        assert_eq!(cursor.completion(), Some(0.25));
    }

    #[test]
    fn test_json_field_names() {
        let cursor = ProgressCursor::new();
        let value = serde_json::to_value(&cursor).unwrap();
        for key in [
            "total_words",
            "processed_words",
            "current_letter",
            "start_time",
            "last_update",
        ] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
        assert!(value["current_letter"].is_null());
    }
}
