//! Service layer for the scanner.
//!
//! This module contains the collaborators the scan controller drives:
//! - Page rendering (`PageRenderer`, implemented by `HttpRenderer`)
//! - Link discovery (`LinkExtractor`, implemented by `HtmlLinkExtractor`)

mod links;
mod renderer;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::PageReport;

pub use links::{HtmlLinkExtractor, extract_links_from_html};
pub use renderer::{HttpRenderer, parse_page};

/// Loads a page and reports what it requested.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<PageReport>;
}

/// Finds the hyperlinks on a page.
#[async_trait]
pub trait LinkExtractor: Send + Sync {
    /// Absolute URLs linked from the page. Best effort: any failure yields an
    /// empty list.
    async fn extract_links(&self, url: &str) -> Vec<String>;
}
