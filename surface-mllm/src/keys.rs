//! Client-local third-party API keys
//!
//! Stored as a small JSON file under fixed names. Keys only ever travel in
//! outgoing generation requests.

use crate::protocol::GenerateRequest;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum KeyStoreError {
    #[error("Failed to access key file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed key file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Which provider a key belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyName {
    OpenAi,
    Gemini,
    Claude,
}

impl KeyName {
    /// Storage name of the key
    pub fn storage_name(&self) -> &'static str {
        match self {
            KeyName::OpenAi => "openaiKey",
            KeyName::Gemini => "geminiKey",
            KeyName::Claude => "claudeKey",
        }
    }
}

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStore {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    openai_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    gemini_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    claude_key: Option<String>,
}

impl fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyStore")
            .field("openai_key", &self.openai_key.is_some())
            .field("gemini_key", &self.gemini_key.is_some())
            .field("claude_key", &self.claude_key.is_some())
            .finish()
    }
}

impl KeyStore {
    /// Load keys from `path`; a missing file is an empty store
    pub fn load(path: &Path) -> Result<Self, KeyStoreError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(KeyStoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let store: KeyStore = serde_json::from_str(&text)?;
        debug!(path = %path.display(), keys = ?store, "Loaded key store");
        Ok(store.normalised())
    }

    pub fn save(&self, path: &Path) -> Result<(), KeyStoreError> {
        let io = |source| KeyStoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(io)
    }

    pub fn get(&self, name: KeyName) -> Option<&str> {
        self.slot(name).as_deref()
    }

    /// Set a key; an empty value removes it
    pub fn set(&mut self, name: KeyName, value: impl Into<String>) {
        *self.slot_mut(name) = non_empty(value.into());
    }

    pub fn remove(&mut self, name: KeyName) {
        *self.slot_mut(name) = None;
    }

    /// Copy the stored keys into an outgoing request
    pub fn apply(&self, request: &mut GenerateRequest) {
        request.openai_key = self.openai_key.clone();
        request.gemini_key = self.gemini_key.clone();
        request.claude_key = self.claude_key.clone();
    }

    fn normalised(self) -> Self {
        Self {
            openai_key: self.openai_key.and_then(non_empty),
            gemini_key: self.gemini_key.and_then(non_empty),
            claude_key: self.claude_key.and_then(non_empty),
        }
    }

    fn slot(&self, name: KeyName) -> &Option<String> {
        match name {
            KeyName::OpenAi => &self.openai_key,
            KeyName::Gemini => &self.gemini_key,
            KeyName::Claude => &self.claude_key,
        }
    }

    fn slot_mut(&mut self, name: KeyName) -> &mut Option<String> {
        match name {
            KeyName::OpenAi => &mut self.openai_key,
            KeyName::Gemini => &mut self.gemini_key,
            KeyName::Claude => &mut self.claude_key,
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/keys.json");

        let mut store = KeyStore::default();
        store.set(KeyName::OpenAi, "sk-123");
        store.set(KeyName::Gemini, "   ");
        store.save(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, json!({"openaiKey": "sk-123"}));

        let loaded = KeyStore::load(&path).unwrap();
        assert_eq!(loaded.get(KeyName::OpenAi), Some("sk-123"));
        assert_eq!(loaded.get(KeyName::Gemini), None);
    }

    #[test]
    fn test_missing_file_is_empty_and_blank_values_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(
            KeyStore::load(&tmp.path().join("absent.json")).unwrap(),
            KeyStore::default()
        );

        let path = tmp.path().join("keys.json");
        std::fs::write(&path, r#"{"openaiKey": "", "claudeKey": "c-1"}"#).unwrap();
        let store = KeyStore::load(&path).unwrap();
        assert_eq!(store.get(KeyName::OpenAi), None);
        assert_eq!(store.get(KeyName::Claude), Some("c-1"));
    }

    #[test]
    fn test_apply_and_debug_redaction() {
        let mut store = KeyStore::default();
        store.set(KeyName::Claude, "secret-claude");

        let mut request: GenerateRequest = serde_json::from_value(json!({})).unwrap();
        request.openai_key = Some("stale".into());
        store.apply(&mut request);
        assert_eq!(request.openai_key, None);
        assert_eq!(request.claude_key.as_deref(), Some("secret-claude"));

        assert!(!format!("{:?}", store).contains("secret-claude"));
        assert_eq!(KeyName::Claude.storage_name(), "claudeKey");
    }
}
