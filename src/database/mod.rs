use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

pub mod manager;
pub mod memory;
pub mod models;
pub mod postgres;

pub use manager::{DatabaseError, DatabaseManager};
pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::resources::Resource;
use models::{ActivityLogEntry, LoginActivity, NewActivity, NewUser, Record, User};

/// Persistence seam shared by the HTTP handlers and services
#[async_trait]
pub trait Store: Send + Sync {
    /// Short backend name reported by `/health`
    fn backend(&self) -> &'static str;

    async fn health_check(&self) -> Result<(), DatabaseError>;

    // Users

    /// Fails with `Duplicate` when the e-mail is taken
    async fn create_user(&self, user: NewUser) -> Result<User, DatabaseError>;
    async fn get_user(&self, id: i64) -> Result<User, DatabaseError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError>;
    async fn update_user(&self, user: &User) -> Result<User, DatabaseError>;
    /// Ordered by id
    async fn list_users(&self) -> Result<Vec<User>, DatabaseError>;

    // Resource records

    async fn insert_record(
        &self,
        resource: Resource,
        owner_id: Option<i64>,
        data: Map<String, Value>,
    ) -> Result<Record, DatabaseError>;
    async fn get_record(&self, resource: Resource, id: i64) -> Result<Record, DatabaseError>;
    /// Ordered by id
    async fn list_records(&self, resource: Resource) -> Result<Vec<Record>, DatabaseError>;
    async fn update_record(
        &self,
        resource: Resource,
        id: i64,
        data: Map<String, Value>,
    ) -> Result<Record, DatabaseError>;
    async fn delete_record(&self, resource: Resource, id: i64) -> Result<(), DatabaseError>;

    // Refresh token blacklist

    async fn blacklist_token(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<(), DatabaseError>;
    async fn is_token_blacklisted(&self, jti: &str) -> Result<bool, DatabaseError>;

    // Audit trail

    async fn record_login(
        &self,
        user: &User,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Result<LoginActivity, DatabaseError>;
    /// Newest first
    async fn list_logins(&self) -> Result<Vec<LoginActivity>, DatabaseError>;
    async fn record_activity(&self, entry: NewActivity) -> Result<ActivityLogEntry, DatabaseError>;
    /// Newest first
    async fn list_activity(&self) -> Result<Vec<ActivityLogEntry>, DatabaseError>;
}

pub(crate) fn not_found(resource: impl std::fmt::Display, id: i64) -> DatabaseError {
    DatabaseError::NotFound(format!("{} {} not found", resource, id))
}
