use std::sync::Arc;
use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::database::memory::MemoryStore;
use crate::database::postgres::PgStore;
use crate::database::Store;

/// Errors from the storage layer
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Map unique-constraint violations to `Duplicate`
    pub(crate) fn from_write(err: sqlx::Error, what: &str) -> Self {
        let unique = err
            .as_database_error()
            .and_then(|db| db.code())
            .is_some_and(|code| code == "23505");
        if unique {
            DatabaseError::Duplicate(what.to_string())
        } else {
            DatabaseError::Sqlx(err)
        }
    }
}

/// Builds the configured store: Postgres when a database URL is set, memory otherwise
pub struct DatabaseManager;

impl DatabaseManager {
    pub async fn open(config: &DatabaseConfig) -> Result<Arc<dyn Store>, DatabaseError> {
        match config.url.as_deref() {
            Some(url) => {
                let pool = Self::connect(url, config).await?;
                let store = PgStore::new(pool);
                store.migrate().await?;
                info!("Using Postgres store");
                Ok(Arc::new(store))
            }
            None => {
                info!("DATABASE_URL not set, using in-memory store");
                Ok(Arc::new(MemoryStore::new()))
            }
        }
    }

    pub async fn connect(url: &str, config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
        let parsed = url::Url::parse(url).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        if !matches!(parsed.scheme(), "postgres" | "postgresql") {
            return Err(DatabaseError::InvalidDatabaseUrl);
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect(url)
            .await?;

        info!(
            "Created database pool for: {}",
            parsed.path().trim_start_matches('/')
        );
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_config(url: Option<&str>) -> DatabaseConfig {
        DatabaseConfig {
            url: url.map(str::to_string),
            max_connections: 2,
            connection_timeout: 1,
        }
    }

    #[tokio::test]
    async fn rejects_non_postgres_urls() {
        let cfg = db_config(Some("mysql://localhost/camaleao"));
        let err = DatabaseManager::open(&cfg).await.err().unwrap();
        assert!(matches!(err, DatabaseError::InvalidDatabaseUrl));
    }

    #[tokio::test]
    async fn falls_back_to_memory_store() {
        let store = DatabaseManager::open(&db_config(None)).await.unwrap();
        assert_eq!(store.backend(), "memory");
        store.health_check().await.unwrap();
    }
}
