//! Crawl task unit.

use serde::{Deserialize, Serialize};

/// A URL scheduled for scanning with the number of link hops still allowed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanTask {
    pub url: String,
    pub depth: u32,
}

impl ScanTask {
    pub fn new(url: impl Into<String>, depth: u32) -> Self {
        Self {
            url: url.into(),
            depth,
        }
    }

    /// Whether links found on this page should be followed.
    pub fn expands(&self) -> bool {
        self.depth > 1
    }

    /// Depth assigned to links discovered on this page.
    pub fn child_depth(&self) -> u32 {
        self.depth.saturating_sub(1)
    }
}
