//! Brave Search adapter for `domain::ports::web::WebClient`. Grounded on the
//! teacher's `infrastructure/claude/client.rs` for the reqwest client-builder
//! idiom; HTML-to-text extraction follows the tag-stripping approach used by
//! `web_fetch` in the pack's `music-brain88-copilot-quorum` tool adapter,
//! implemented here with `regex` rather than a DOM parser dependency.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client as ReqwestClient;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;

use crate::domain::error::WebError;
use crate::domain::ports::web::{FetchedPage, SearchResult, WebClient};

const SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";

pub struct BraveWebClient {
    http_client: ReqwestClient,
    api_key: String,
}

impl BraveWebClient {
    pub fn new(api_key: String) -> Result<Self, WebError> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| WebError::SearchFailed(format!("failed to build http client: {e}")))?;
        Ok(Self { http_client, api_key })
    }
}

#[async_trait]
impl WebClient for BraveWebClient {
    async fn search_web(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>, WebError> {
        let response = self
            .http_client
            .get(SEARCH_URL)
            .header("X-Subscription-Token", &self.api_key)
            .header("Accept", "application/json")
            .query(&[("q", query), ("count", &max_results.to_string())])
            .send()
            .await
            .map_err(|e| to_web_error(e, WebError::SearchFailed(e.to_string())))?;

        if !response.status().is_success() {
            return Err(WebError::SearchFailed(format!("brave search returned {}", response.status())));
        }

        let body: BraveSearchResponse = response
            .json()
            .await
            .map_err(|e| WebError::SearchFailed(format!("failed to parse brave response: {e}")))?;

        Ok(body
            .web
            .map(|w| w.results)
            .unwrap_or_default()
            .into_iter()
            .take(max_results)
            .map(|r| SearchResult { title: r.title, url: r.url, snippet: r.description.unwrap_or_default() })
            .collect())
    }

    async fn fetch_page(&self, url: &str, max_chars: usize) -> Result<FetchedPage, WebError> {
        let response = self
            .http_client
            .get(url)
            .header("User-Agent", "conclave-web-fetch/1.0")
            .send()
            .await
            .map_err(|e| to_web_error(e, WebError::FetchFailed(e.to_string())))?;

        if !response.status().is_success() {
            return Err(WebError::FetchFailed(format!("{url} returned {}", response.status())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| WebError::FetchFailed(format!("failed to read body of {url}: {e}")))?;

        let text = html_to_text(&body);
        let truncated: String = text.chars().take(max_chars).collect();
        let title = extract_title(&body).unwrap_or_else(|| url.to_string());

        Ok(FetchedPage { content: truncated, title, url: url.to_string() })
    }
}

fn to_web_error(err: reqwest::Error, fallback: WebError) -> WebError {
    if err.is_timeout() {
        WebError::Timeout(10)
    } else {
        fallback
    }
}

fn script_style_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?is)<(script|style|noscript)[^>]*>.*?</\1>").expect("static pattern"))
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)<[^>]+>").expect("static pattern"))
}

fn title_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("static pattern"))
}

fn whitespace_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\s+").expect("static pattern"))
}

/// Strips scripts, styles, and tags, then collapses whitespace. Not a DOM
/// parser — good enough for feeding prose into a research phase, not for
/// structural extraction.
pub fn html_to_text(html: &str) -> String {
    let without_scripts = script_style_pattern().replace_all(html, "");
    let without_tags = tag_pattern().replace_all(&without_scripts, " ");
    whitespace_pattern().replace_all(&without_tags, " ").trim().to_string()
}

fn extract_title(html: &str) -> Option<String> {
    title_pattern()
        .captures(html)
        .map(|c| whitespace_pattern().replace_all(c[1].trim(), " ").to_string())
}

#[derive(Debug, Deserialize)]
struct BraveSearchResponse {
    web: Option<BraveWebResults>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResults {
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    title: String,
    url: String,
    description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_to_text_strips_scripts_and_tags() {
        let html = "<html><head><title>Hi</title><script>evil()</script></head><body><p>Hello <b>world</b></p></body></html>";
        let text = html_to_text(html);
        assert_eq!(text, "Hello world");
    }

    #[test]
    fn extract_title_reads_the_title_tag() {
        assert_eq!(extract_title("<title>  A Page  </title>"), Some("A Page".to_string()));
        assert_eq!(extract_title("<body>no title</body>"), None);
    }
}
