//! Web collaborator port (§6): `searchWeb` and `fetchPage`.

use async_trait::async_trait;

use crate::domain::error::WebError;

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub content: String,
    pub title: String,
    pub url: String,
}

/// The web search/fetch provider. Both operations honor a 10s timeout at the
/// adapter level and report errors rather than throwing (§6).
#[async_trait]
pub trait WebClient: Send + Sync {
    async fn search_web(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>, WebError>;
    async fn fetch_page(&self, url: &str, max_chars: usize) -> Result<FetchedPage, WebError>;
}

/// No-op client substituted when `BRAVE_API_KEY` is unset. Research phases
/// degrade gracefully to empty source lists rather than failing the step.
pub struct NullWebClient;

#[async_trait]
impl WebClient for NullWebClient {
    async fn search_web(&self, _query: &str, _max_results: usize) -> Result<Vec<SearchResult>, WebError> {
        Ok(vec![])
    }

    async fn fetch_page(&self, url: &str, _max_chars: usize) -> Result<FetchedPage, WebError> {
        Err(WebError::FetchFailed(format!("no web client configured, cannot fetch {url}")))
    }
}
