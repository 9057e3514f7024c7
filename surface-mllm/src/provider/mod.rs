//! Static example data provider abstraction and implementations
//!
//! An example is addressed by a key and made of three JSON documents:
//! `<base>/<key>/metadata.json`, `descriptions.json` and `summary.json`.

mod dir;
mod http;

pub use dir::DirExampleSource;
pub use http::HttpExampleSource;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::fmt;
use thiserror::Error;

/// Errors that can occur when fetching an example document
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed {document}: {source}")]
    Parse {
        document: ExampleDocument,
        #[source]
        source: serde_json::Error,
    },

    #[error("Example not found: {0}")]
    NotFound(String),

    #[error("Invalid example key: {0:?}")]
    InvalidKey(String),

    #[error("Provider returned error: {0}")]
    ProviderError(String),
}

/// The three documents that make up an example
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExampleDocument {
    Metadata,
    Descriptions,
    Summary,
}

impl ExampleDocument {
    pub const ALL: [ExampleDocument; 3] = [
        ExampleDocument::Metadata,
        ExampleDocument::Descriptions,
        ExampleDocument::Summary,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            ExampleDocument::Metadata => "metadata.json",
            ExampleDocument::Descriptions => "descriptions.json",
            ExampleDocument::Summary => "summary.json",
        }
    }
}

impl fmt::Display for ExampleDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Reject keys that could escape the example root
pub fn validate_key(key: &str) -> Result<&str, SourceError> {
    let key = key.trim();
    let bad = key.is_empty()
        || key == "."
        || key.contains("..")
        || key.contains('/')
        || key.contains('\\')
        || key.contains('\0');
    if bad {
        Err(SourceError::InvalidKey(key.to_string()))
    } else {
        Ok(key)
    }
}

/// Source of static example documents
#[async_trait]
pub trait ExampleSource: Send + Sync {
    /// Get the source name for logging
    fn name(&self) -> &str;

    /// Fetch one document of an example as raw bytes
    async fn fetch(&self, key: &str, document: ExampleDocument) -> Result<Vec<u8>, SourceError>;

    /// List the example keys this source knows about
    async fn list(&self) -> Result<Vec<String>, SourceError>;
}

/// Fetch a document and decode it
pub async fn fetch_json<T>(
    source: &dyn ExampleSource,
    key: &str,
    document: ExampleDocument,
) -> Result<T, SourceError>
where
    T: DeserializeOwned,
{
    let bytes = source.fetch(key, document).await?;
    serde_json::from_slice(&bytes).map_err(|source| SourceError::Parse { document, source })
}
