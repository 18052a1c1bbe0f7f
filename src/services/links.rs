// src/services/links.rs

//! Hyperlink discovery over plain HTTP.

use std::sync::LazyLock;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use url::Url;

use crate::error::Result;
use crate::services::LinkExtractor;
use crate::utils::{dedup_preserving_order, http, is_followable_href, is_http_url, resolve_url};

static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid anchor selector"));

/// Fetches a page and collects its `<a href>` targets.
#[derive(Clone)]
pub struct HtmlLinkExtractor {
    client: Client,
}

impl HtmlLinkExtractor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn fetch_html(&self, url: &str) -> Result<Option<String>> {
        let response = http::fetch(&self.client, url).await?;
        if !response.status().is_success() {
            log::debug!("Link fetch for {} returned {}", url, response.status());
            return Ok(None);
        }
        if !http::is_html(&response) {
            log::debug!("Skipping links for non-HTML {}", url);
            return Ok(None);
        }
        Ok(Some(response.text().await?))
    }
}

#[async_trait]
impl LinkExtractor for HtmlLinkExtractor {
    async fn extract_links(&self, url: &str) -> Vec<String> {
        match self.fetch_html(url).await {
            Ok(Some(html)) => extract_links_from_html(url, &html),
            Ok(None) => Vec::new(),
            Err(e) => {
                log::debug!("Link extraction failed for {}: {}", url, e);
                Vec::new()
            }
        }
    }
}

/// Absolute http(s) links found in a document, first occurrence first.
pub fn extract_links_from_html(page_url: &str, html: &str) -> Vec<String> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);

    let links = document
        .select(&ANCHOR)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| is_followable_href(href))
        .filter_map(|href| resolve_url(&base, href))
        .filter(|link| is_http_url(link));

    dedup_preserving_order(links)
}
