//! Token provider implementations
//!
//! A provider yields the bearer token used against the source API. Failure
//! to obtain a non-empty token is an [`Error::Auth`], which the orchestrator
//! treats as fatal.

use crate::config::TokenConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Source of bearer tokens
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return the current bearer token
    async fn token(&self) -> Result<String>;
}

/// Build the provider described by the configuration, cached for one run
pub fn provider_from_config(config: &TokenConfig) -> Arc<dyn TokenProvider> {
    let inner: Arc<dyn TokenProvider> = match config {
        TokenConfig::Env(var) => Arc::new(EnvTokenProvider::new(var.clone())),
        TokenConfig::File(path) => Arc::new(FileTokenProvider::new(path)),
        TokenConfig::Value(token) => Arc::new(StaticTokenProvider::new(token.clone())),
    };
    Arc::new(CachedTokenProvider::new(inner))
}

fn non_empty(token: String, origin: &str) -> Result<String> {
    let token = token.trim().to_string();
    if token.is_empty() {
        return Err(Error::auth(format!("{origin} is empty")));
    }
    Ok(token)
}

/// Reads the token from an environment variable
#[derive(Debug, Clone)]
pub struct EnvTokenProvider {
    var: String,
}

impl EnvTokenProvider {
    /// Create a provider for the given variable name
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait]
impl TokenProvider for EnvTokenProvider {
    async fn token(&self) -> Result<String> {
        let value = std::env::var(&self.var)
            .map_err(|e| Error::auth(format!("Token variable {}: {e}", self.var)))?;
        non_empty(value, &format!("Token variable {}", self.var))
    }
}

/// Reads the token from a file, e.g. a mounted secret
#[derive(Debug, Clone)]
pub struct FileTokenProvider {
    path: PathBuf,
}

impl FileTokenProvider {
    /// Create a provider for the given file
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl TokenProvider for FileTokenProvider {
    async fn token(&self) -> Result<String> {
        let value = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::auth(format!("Failed to read token file {}: {e}", self.path.display()))
        })?;
        non_empty(value, &format!("Token file {}", self.path.display()))
    }
}

/// A fixed token
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    /// Create a provider returning `token`
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenProvider").finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<String> {
        non_empty(self.token.clone(), "Static token")
    }
}

/// Fetches the token from an inner provider once and reuses it
pub struct CachedTokenProvider {
    inner: Arc<dyn TokenProvider>,
    cached: RwLock<Option<String>>,
}

impl CachedTokenProvider {
    /// Wrap a provider
    pub fn new(inner: Arc<dyn TokenProvider>) -> Self {
        Self {
            inner,
            cached: RwLock::new(None),
        }
    }
}

#[async_trait]
impl TokenProvider for CachedTokenProvider {
    async fn token(&self) -> Result<String> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref() {
                return Ok(token.clone());
            }
        }

        let mut cached = self.cached.write().await;

        // Double-check after acquiring write lock
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let token = self.inner.token().await?;
        *cached = Some(token.clone());
        Ok(token)
    }
}
