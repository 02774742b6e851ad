use std::sync::Arc;

use chrono::Utc;

use crate::auth::hash_password;
use crate::config::AppConfig;
use crate::database::models::{NewUser, Role, User};
use crate::database::{MemoryStore, Store};
use crate::server::AppState;

/// Bare user value for tests that never touch a store
pub fn user(id: i64, email: &str, role: Role) -> User {
    NewUser::new(email, "", role).into_user(id, Utc::now())
}

/// In-memory application state with helpers to seed users
pub struct TestContext {
    pub store: Arc<dyn Store>,
    pub state: AppState,
}

impl TestContext {
    pub fn new() -> Self {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let state = AppState::new(store.clone(), AppConfig::for_tests());
        Self { store, state }
    }

    pub async fn create_user(&self, email: &str, password: &str, role: Role) -> anyhow::Result<User> {
        let hash = hash_password(password)?;
        Ok(self.store.create_user(NewUser::new(email, hash, role)).await?)
    }

    /// Valid access token for an existing user
    pub fn access_token(&self, user: &User) -> anyhow::Result<String> {
        Ok(self.state.tokens.issue(user, crate::auth::TokenType::Access)?)
    }
}
