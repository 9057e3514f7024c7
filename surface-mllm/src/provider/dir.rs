//! Examples served from a local directory tree

use super::{validate_key, ExampleDocument, ExampleSource, SourceError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

/// Reads `<root>/<key>/<document>`
pub struct DirExampleSource {
    root: PathBuf,
    name: String,
}

impl DirExampleSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = format!("dir:{}", root.display());
        Self { root, name }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

#[async_trait]
impl ExampleSource for DirExampleSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, key: &str, document: ExampleDocument) -> Result<Vec<u8>, SourceError> {
        let key = validate_key(key)?;
        let path = self.root.join(key).join(document.file_name());
        debug!(path = %path.display(), "Reading example document");

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(SourceError::NotFound(format!("{}/{}", key, document)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<String>, SourceError> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    keys.push(name.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::fetch_json;

    fn write_example(root: &std::path::Path, key: &str) {
        let dir = root.join(key);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("metadata.json"), r#"{"prompt": "Describe."}"#).unwrap();
    }

    #[tokio::test]
    async fn test_fetch_and_missing() {
        let tmp = tempfile::tempdir().unwrap();
        write_example(tmp.path(), "fashion");
        let source = DirExampleSource::new(tmp.path());

        let value: serde_json::Value =
            fetch_json(&source, "fashion", ExampleDocument::Metadata).await.unwrap();
        assert_eq!(value["prompt"], "Describe.");

        assert!(matches!(
            source.fetch("fashion", ExampleDocument::Summary).await,
            Err(SourceError::NotFound(_))
        ));
        assert!(matches!(
            source.fetch("../fashion", ExampleDocument::Metadata).await,
            Err(SourceError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_document() {
        let tmp = tempfile::tempdir().unwrap();
        write_example(tmp.path(), "a");
        std::fs::write(tmp.path().join("a/summary.json"), "{not json").unwrap();
        let source = DirExampleSource::new(tmp.path());

        let result: Result<serde_json::Value, _> =
            fetch_json(&source, "a", ExampleDocument::Summary).await;
        assert!(matches!(
            result,
            Err(SourceError::Parse { document: ExampleDocument::Summary, .. })
        ));
    }

    #[tokio::test]
    async fn test_list_skips_files_and_hidden() {
        let tmp = tempfile::tempdir().unwrap();
        write_example(tmp.path(), "wildlife");
        write_example(tmp.path(), "fashion");
        write_example(tmp.path(), ".cache");
        std::fs::write(tmp.path().join("README.md"), "x").unwrap();

        let keys = DirExampleSource::new(tmp.path()).list().await.unwrap();
        assert_eq!(keys, vec!["fashion", "wildlife"]);
    }
}
