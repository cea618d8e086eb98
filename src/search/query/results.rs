//! Search results container

use serde::Serialize;
use serde_json::{Map, Value};

/// One page of projected search results
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
    /// Rows in this page
    pub count: usize,
    /// Matching documents across all pages
    pub total: u64,
    pub results: Vec<Map<String, Value>>,
    pub offset: usize,
}

impl SearchResults {
    /// Check if there are more results available
    #[must_use]
    pub fn has_more(&self) -> bool {
        ((self.offset + self.count) as u64) < self.total
    }

    /// Get the next page offset
    #[must_use]
    pub fn next_offset(&self) -> Option<usize> {
        if self.has_more() {
            Some(self.offset + self.count)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_offset() {
        let page = SearchResults {
            count: 10,
            total: 25,
            results: Vec::new(),
            offset: 10,
        };
        assert_eq!(page.next_offset(), Some(20));

        let last = SearchResults {
            count: 5,
            total: 25,
            results: Vec::new(),
            offset: 20,
        };
        assert_eq!(last.next_offset(), None);
    }
}
