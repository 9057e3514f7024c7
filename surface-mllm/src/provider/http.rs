//! Examples served as static files over HTTP

use super::{validate_key, ExampleDocument, ExampleSource, SourceError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound on keys tried by [`HttpExampleSource::list`]
pub const DEFAULT_LIST_LIMIT: usize = 500;

/// Fetches `<base_url>/<key>/<document>`
pub struct HttpExampleSource {
    client: Client,
    base_url: String,
    name: String,
    list_limit: usize,
}

impl HttpExampleSource {
    /// Create a source rooted at `base_url`, e.g. `http://localhost:3000/data`
    pub fn new(base_url: impl Into<String>) -> Result<Self, SourceError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let name = format!("http:{}", base_url);

        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(30)).build()?,
            base_url,
            name,
            list_limit: DEFAULT_LIST_LIMIT,
        })
    }

    /// Stop listing after `limit` keys
    pub fn with_list_limit(mut self, limit: usize) -> Self {
        self.list_limit = limit;
        self
    }

    fn url(&self, key: &str, document: ExampleDocument) -> String {
        format!("{}/{}/{}", self.base_url, key, document.file_name())
    }
}

#[async_trait]
impl ExampleSource for HttpExampleSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, key: &str, document: ExampleDocument) -> Result<Vec<u8>, SourceError> {
        let key = validate_key(key)?;
        let url = self.url(key, document);
        debug!(%url, "Fetching example document");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(format!("{}/{}", key, document)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::ProviderError(format!("HTTP {}: {}", status, body)));
        }

        Ok(response.bytes().await?.to_vec())
    }

    /// Static hosting has no directory listing; examples are numbered `1..`
    ///
    /// Probing ends at the first key whose metadata is missing or is not a
    /// JSON object (servers with a catch-all page answer 200 for any path),
    /// or after the list limit.
    async fn list(&self) -> Result<Vec<String>, SourceError> {
        let mut keys = Vec::new();
        for n in 1..=self.list_limit {
            let key = n.to_string();
            match self.fetch(&key, ExampleDocument::Metadata).await {
                Ok(body) if is_json_object(&body) => keys.push(key),
                Ok(_) => {
                    debug!(key, "Metadata is not a JSON object, ending listing");
                    return Ok(keys);
                }
                Err(SourceError::NotFound(_)) => return Ok(keys),
                Err(e) => return Err(e),
            }
        }
        warn!(limit = self.list_limit, source = %self.name, "Example listing truncated");
        Ok(keys)
    }
}

fn is_json_object(body: &[u8]) -> bool {
    serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(body).is_ok()
}
