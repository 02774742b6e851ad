//! Where the client keeps its tokens between requests (and between runs).

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use super::ClientError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
    /// Cookie-mode refresh cookie (`name=value`), so a new process can refresh
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_cookie: Option<String>,
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn access(&self) -> Option<String>;
    async fn set_access(&self, token: Option<String>) -> Result<(), ClientError>;
    async fn refresh(&self) -> Option<String>;
    async fn set_refresh(&self, token: Option<String>) -> Result<(), ClientError>;
    async fn refresh_cookie(&self) -> Option<String>;
    async fn set_refresh_cookie(&self, cookie: Option<String>) -> Result<(), ClientError>;
    /// Removes both tokens; clearing an empty store succeeds
    async fn clear(&self) -> Result<(), ClientError>;
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<StoredTokens>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn access(&self) -> Option<String> {
        self.tokens.read().await.access.clone()
    }

    async fn set_access(&self, token: Option<String>) -> Result<(), ClientError> {
        self.tokens.write().await.access = token;
        Ok(())
    }

    async fn refresh(&self) -> Option<String> {
        self.tokens.read().await.refresh.clone()
    }

    async fn set_refresh(&self, token: Option<String>) -> Result<(), ClientError> {
        self.tokens.write().await.refresh = token;
        Ok(())
    }

    async fn refresh_cookie(&self) -> Option<String> {
        self.tokens.read().await.refresh_cookie.clone()
    }

    async fn set_refresh_cookie(&self, cookie: Option<String>) -> Result<(), ClientError> {
        self.tokens.write().await.refresh_cookie = cookie;
        Ok(())
    }

    async fn clear(&self) -> Result<(), ClientError> {
        *self.tokens.write().await = StoredTokens::default();
        Ok(())
    }
}

/// JSON file store used by the CLI; the file is rewritten on every change
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    tokens: RwLock<StoredTokens>,
}

impl FileTokenStore {
    /// Loads existing tokens; a missing or unreadable file starts empty
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let tokens = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => StoredTokens::default(),
        };
        Self {
            path,
            tokens: RwLock::new(tokens),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    async fn persist(&self, tokens: &StoredTokens) -> Result<(), ClientError> {
        if tokens == &StoredTokens::default() {
            return match tokio::fs::remove_file(&self.path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(ClientError::Storage(e.to_string())),
            };
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ClientError::Storage(e.to_string()))?;
        }
        let content = serde_json::to_string_pretty(tokens).map_err(|e| ClientError::Storage(e.to_string()))?;
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| ClientError::Storage(e.to_string()))?;
        debug!("Saved tokens to {}", self.path.display());
        Ok(())
    }

    async fn update(&self, apply: impl FnOnce(&mut StoredTokens)) -> Result<(), ClientError> {
        let mut tokens = self.tokens.write().await;
        apply(&mut tokens);
        self.persist(&tokens).await
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn access(&self) -> Option<String> {
        self.tokens.read().await.access.clone()
    }

    async fn set_access(&self, token: Option<String>) -> Result<(), ClientError> {
        self.update(|t| t.access = token).await
    }

    async fn refresh(&self) -> Option<String> {
        self.tokens.read().await.refresh.clone()
    }

    async fn set_refresh(&self, token: Option<String>) -> Result<(), ClientError> {
        self.update(|t| t.refresh = token).await
    }

    async fn refresh_cookie(&self) -> Option<String> {
        self.tokens.read().await.refresh_cookie.clone()
    }

    async fn set_refresh_cookie(&self, cookie: Option<String>) -> Result<(), ClientError> {
        self.update(|t| t.refresh_cookie = cookie).await
    }

    async fn clear(&self) -> Result<(), ClientError> {
        self.update(|t| *t = StoredTokens::default()).await
    }
}
