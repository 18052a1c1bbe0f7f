// src/services/renderer.rs

//! HTTP page renderer.
//!
//! Fetches the document and derives the page report from its markup: the
//! title, the script resources it loads, endpoints that look like API calls,
//! and GET/POST counts for the requests the page declares. Scripts are not
//! executed, so requests built at runtime are invisible here.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use url::Url;

use crate::error::Result;
use crate::models::PageReport;
use crate::services::PageRenderer;
use crate::utils::{dedup_preserving_order, http, resolve_url};

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid static selector")
}

static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("title"));
static SCRIPT_SRC: LazyLock<Selector> = LazyLock::new(|| selector("script[src]"));
static INLINE_SCRIPT: LazyLock<Selector> = LazyLock::new(|| selector("script:not([src])"));
static SUBRESOURCE: LazyLock<Selector> = LazyLock::new(|| {
    selector("link[rel~=\"stylesheet\"][href], img[src], iframe[src]")
});
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static FORM: LazyLock<Selector> = LazyLock::new(|| selector("form"));

/// `fetch("/x")`, `axios.get("/x")`, `$.ajax("/x")`
static CALL_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:\bfetch|\baxios(?:\.[a-z]+)?|\$\.(?:ajax|get|post|getJSON))\(\s*["'`]([^"'`\s]+)["'`]"#)
        .expect("valid call regex")
});
/// `xhr.open("POST", "/x")`
static XHR_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\.open\(\s*["']([A-Za-z]+)["']\s*,\s*["'`]([^"'`\s]+)["'`]"#)
        .expect("valid xhr regex")
});
/// Any quoted literal containing `/api/`
static API_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["'`]([^"'`\s]*/api/[^"'`\s]*)["'`]"#).expect("valid api regex")
});

/// Renders pages with a plain HTTP GET.
#[derive(Clone)]
pub struct HttpRenderer {
    client: Client,
}

impl HttpRenderer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageRenderer for HttpRenderer {
    async fn render(&self, url: &str) -> Result<PageReport> {
        let response = http::fetch(&self.client, url).await?;
        let status = response.status().as_u16();

        if !http::is_html(&response) {
            let mut report = PageReport::new(url, status);
            report.get_count = 1;
            return Ok(report);
        }

        let body = response.text().await?;
        Ok(parse_page(url, status, &body))
    }
}

/// Build a page report from an HTML document.
pub fn parse_page(url: &str, status_code: u16, html: &str) -> PageReport {
    let document = Html::parse_document(html);
    let base = Url::parse(url).ok();
    let resolve = |href: &str| base.as_ref().and_then(|b| resolve_url(b, href));

    let mut report = PageReport::new(url, status_code);

    report.title = document
        .select(&TITLE)
        .next()
        .map(|t| normalize_whitespace(&t.text().collect::<String>()))
        .unwrap_or_default();

    report.script_urls = dedup_preserving_order(
        document
            .select(&SCRIPT_SRC)
            .filter_map(|s| s.value().attr("src"))
            .filter_map(|src| resolve(src)),
    );

    let inline_js: String = document
        .select(&INLINE_SCRIPT)
        .flat_map(|s| s.text())
        .collect::<Vec<_>>()
        .join("\n");

    let mut gets = 1 + report.script_urls.len() + document.select(&SUBRESOURCE).count();
    let mut posts = 0;
    let mut api_candidates = Vec::new();

    for form in document.select(&FORM) {
        let post = form
            .value()
            .attr("method")
            .is_some_and(|m| m.trim().eq_ignore_ascii_case("post"));
        if post {
            posts += 1;
        }
        if let Some(action) = form.value().attr("action") {
            api_candidates.extend(resolve(action).filter(|u| post || is_api_url(u)));
        }
    }

    for href in document.select(&ANCHOR).filter_map(|a| a.value().attr("href")) {
        api_candidates.extend(resolve(href).filter(|u| is_api_url(u)));
    }

    for caps in CALL_TARGET.captures_iter(&inline_js) {
        gets += 1;
        api_candidates.extend(resolve(&caps[1]));
    }

    for caps in XHR_OPEN.captures_iter(&inline_js) {
        if caps[1].eq_ignore_ascii_case("post") {
            posts += 1;
        } else {
            gets += 1;
        }
        api_candidates.extend(resolve(&caps[2]));
    }

    for caps in API_LITERAL.captures_iter(&inline_js) {
        api_candidates.extend(resolve(&caps[1]));
    }

    report.api_urls = dedup_preserving_order(api_candidates);
    report.get_count = gets;
    report.post_count = posts;
    report
}

fn is_api_url(url: &str) -> bool {
    url.contains("/api/")
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
