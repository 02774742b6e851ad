use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::models::{ActivityLogEntry, LoginActivity, NewActivity, NewUser, Record, User};
use super::{not_found, DatabaseError, Store};
use crate::resources::Resource;

#[derive(Default)]
struct MemoryState {
    users: BTreeMap<i64, User>,
    next_user_id: i64,
    records: HashMap<Resource, BTreeMap<i64, Record>>,
    next_record_id: HashMap<Resource, i64>,
    blacklist: HashMap<String, DateTime<Utc>>,
    logins: Vec<LoginActivity>,
    activity: Vec<ActivityLogEntry>,
}

/// Process-local store for development and tests; all data is lost on exit
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        Ok(())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, DatabaseError> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(DatabaseError::Duplicate(format!("user with email {}", user.email)));
        }
        state.next_user_id += 1;
        let id = state.next_user_id;
        let user = user.into_user(id, Utc::now());
        state.users.insert(id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: i64) -> Result<User, DatabaseError> {
        let state = self.state.read().await;
        state.users.get(&id).cloned().ok_or_else(|| not_found("user", id))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn update_user(&self, user: &User) -> Result<User, DatabaseError> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.id != user.id && u.email == user.email) {
            return Err(DatabaseError::Duplicate(format!("user with email {}", user.email)));
        }
        let slot = state.users.get_mut(&user.id).ok_or_else(|| not_found("user", user.id))?;
        *slot = user.clone();
        Ok(user.clone())
    }

    async fn list_users(&self) -> Result<Vec<User>, DatabaseError> {
        Ok(self.state.read().await.users.values().cloned().collect())
    }

    async fn insert_record(
        &self,
        resource: Resource,
        owner_id: Option<i64>,
        data: Map<String, Value>,
    ) -> Result<Record, DatabaseError> {
        let mut state = self.state.write().await;
        let next = state.next_record_id.entry(resource).or_insert(0);
        *next += 1;
        let id = *next;

        let now = Utc::now();
        let record = Record {
            id,
            resource,
            owner_id,
            data,
            created_at: now,
            updated_at: now,
        };
        state.records.entry(resource).or_default().insert(id, record.clone());
        Ok(record)
    }

    async fn get_record(&self, resource: Resource, id: i64) -> Result<Record, DatabaseError> {
        let state = self.state.read().await;
        state
            .records
            .get(&resource)
            .and_then(|table| table.get(&id))
            .cloned()
            .ok_or_else(|| not_found(resource, id))
    }

    async fn list_records(&self, resource: Resource) -> Result<Vec<Record>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .records
            .get(&resource)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn update_record(
        &self,
        resource: Resource,
        id: i64,
        data: Map<String, Value>,
    ) -> Result<Record, DatabaseError> {
        let mut state = self.state.write().await;
        let record = state
            .records
            .get_mut(&resource)
            .and_then(|table| table.get_mut(&id))
            .ok_or_else(|| not_found(resource, id))?;
        record.data = data;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn delete_record(&self, resource: Resource, id: i64) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        state
            .records
            .get_mut(&resource)
            .and_then(|table| table.remove(&id))
            .map(|_| ())
            .ok_or_else(|| not_found(resource, id))
    }

    async fn blacklist_token(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        state.blacklist.retain(|_, exp| *exp > now);
        state.blacklist.insert(jti.to_string(), expires_at);
        Ok(())
    }

    async fn is_token_blacklisted(&self, jti: &str) -> Result<bool, DatabaseError> {
        Ok(self.state.read().await.blacklist.contains_key(jti))
    }

    async fn record_login(
        &self,
        user: &User,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Result<LoginActivity, DatabaseError> {
        let mut state = self.state.write().await;
        let entry = LoginActivity {
            id: state.logins.len() as i64 + 1,
            user_id: user.id,
            email: user.email.clone(),
            ip_address,
            user_agent,
            logged_at: Utc::now(),
        };
        state.logins.push(entry.clone());
        Ok(entry)
    }

    async fn list_logins(&self) -> Result<Vec<LoginActivity>, DatabaseError> {
        Ok(self.state.read().await.logins.iter().rev().cloned().collect())
    }

    async fn record_activity(&self, entry: NewActivity) -> Result<ActivityLogEntry, DatabaseError> {
        let mut state = self.state.write().await;
        let entry = entry.into_entry(state.activity.len() as i64 + 1, Utc::now());
        state.activity.push(entry.clone());
        Ok(entry)
    }

    async fn list_activity(&self) -> Result<Vec<ActivityLogEntry>, DatabaseError> {
        Ok(self.state.read().await.activity.iter().rev().cloned().collect())
    }
}
