//! User-token storage with JSON file persistence.

use dashmap::DashMap;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

/// Thread-safe map of wallet-provider name to issued user token.
#[derive(Clone, Default)]
pub struct TokenStore {
    inner: Arc<DashMap<String, String>>,
    persistence_path: Option<String>,
}

impl TokenStore {
    /// Empty store; `None` keeps tokens in memory only.
    pub fn new(persistence_path: Option<String>) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            persistence_path,
        }
    }

    /// Load from file if it exists.
    pub fn load(path: &str) -> std::io::Result<Self> {
        let store = Self::new(Some(path.to_string()));
        if Path::new(path).exists() {
            let reader = BufReader::new(File::open(path)?);
            let map: HashMap<String, String> = serde_json::from_reader(reader)?;
            for (provider, token) in map {
                store.inner.insert(provider, token);
            }
            tracing::info!(path = %path, tokens = store.inner.len(), "Loaded user tokens");
        }
        Ok(store)
    }

    fn save(&self) -> std::io::Result<()> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };
        let map: HashMap<String, String> = self
            .inner
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, &map)?;
        Ok(())
    }

    pub fn get(&self, provider: &str) -> Option<String> {
        self.inner.get(provider).map(|r| r.value().clone())
    }

    /// Store the token issued after a successful login.
    pub fn set(&self, provider: &str, token: &str) -> std::io::Result<()> {
        self.inner.insert(provider.to_string(), token.to_string());
        self.save()
    }

    /// Forget the token (sign-out).
    pub fn clear(&self, provider: &str) -> std::io::Result<()> {
        self.inner.remove(provider);
        self.save()
    }
}
