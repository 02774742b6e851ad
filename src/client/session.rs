//! Login state for the shell: who is signed in and how they got there.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::claims::{decode_unverified, TokenClaims};
use super::events::ReauthReason;
use super::http::{ApiClient, AuthMode};
use super::ClientError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub job_title: Option<String>,
}

impl From<&TokenClaims> for CurrentUser {
    fn from(claims: &TokenClaims) -> Self {
        Self {
            id: claims.user_id,
            email: claims.email.clone(),
            first_name: claims.first_name.clone(),
            last_name: String::new(),
            role: claims.role.clone(),
            job_title: None,
        }
    }
}

pub struct Session {
    client: ApiClient,
    /// The user and the logout generation they were loaded under
    user: RwLock<Option<(CurrentUser, u64)>>,
}

impl Session {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            user: RwLock::new(None),
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    async fn set_user(&self, user: Option<CurrentUser>) {
        let generation = self.client.events().generation();
        *self.user.write().await = user.map(|u| (u, generation));
    }

    /// None once a forced logout happened after the user was loaded
    pub async fn current_user(&self) -> Option<CurrentUser> {
        let generation = self.client.events().generation();
        let mut slot = self.user.write().await;
        match slot.as_ref() {
            Some((_, loaded)) if *loaded != generation => {
                *slot = None;
                None
            }
            Some((user, _)) => Some(user.clone()),
            None => None,
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<CurrentUser, ClientError> {
        let email = email.trim().to_lowercase();
        let mode = self.client.mode();
        let body = json!({ "email": email, "password": password });

        let response = self
            .client
            .request_public(reqwest::Method::POST, mode.login_path(), Some(&body))
            .await?;

        let access = response
            .get("access")
            .and_then(Value::as_str)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| ClientError::Decode("login response has no access token".into()))?;
        let claims = decode_unverified(access)
            .ok_or_else(|| ClientError::Decode("access token payload is unreadable".into()))?;

        let tokens = self.client.tokens();
        tokens.set_access(Some(access.to_string())).await?;
        // Cookie mode also returns the pair; only header mode keeps the refresh token
        let refresh = match mode {
            AuthMode::Header => response.get("refresh").and_then(Value::as_str).map(str::to_string),
            AuthMode::Cookie => None,
        };
        tokens.set_refresh(refresh).await?;
        self.client.save_refresh_cookie().await?;

        self.set_user(Some(CurrentUser::from(&claims))).await;
        info!("Logged in as {}", email);

        if let Err(e) = self.refresh_user().await {
            debug!("Profile fetch after login failed: {}", e);
        }
        self.current_user()
            .await
            .ok_or_else(|| ClientError::Decode("session ended during login".into()))
    }

    /// Always leaves the token store empty, even when the server is unreachable
    pub async fn logout(&self) -> Result<(), ClientError> {
        if let Err(e) = self.client.restore_refresh_cookie().await {
            debug!("Refresh cookie unavailable for logout: {}", e);
        }
        let refresh = self.client.tokens().refresh().await;
        let body = json!({ "refresh": refresh });
        if let Err(e) = self
            .client
            .request_public(reqwest::Method::POST, "auth/logout/", Some(&body))
            .await
        {
            debug!("Server logout failed: {}", e);
        }

        self.client.tokens().clear().await?;
        self.set_user(None).await;
        Ok(())
    }

    /// Restore the user from stored tokens at startup
    pub async fn bootstrap(&self) -> Option<CurrentUser> {
        let access = self.client.tokens().access().await?;
        if let Some(claims) = decode_unverified(&access).filter(|c| !c.is_expired(chrono::Utc::now())) {
            self.set_user(Some(CurrentUser::from(&claims))).await;
        }

        if let Err(e) = self.refresh_user().await {
            debug!("Profile fetch during bootstrap failed: {}", e);
        }
        self.current_user().await
    }

    pub async fn refresh_user(&self) -> Result<CurrentUser, ClientError> {
        let body = self.client.get("users/me/").await?;
        let user: CurrentUser = serde_json::from_value(body).map_err(|e| ClientError::Decode(e.to_string()))?;
        self.set_user(Some(user.clone())).await;
        Ok(user)
    }

    /// PATCH users/me/; a password change ends the session
    pub async fn update_profile(&self, mut changes: Value) -> Result<Value, ClientError> {
        let changes_password = changes.get("password").is_some();
        if changes_password {
            if let (Some(obj), Some(refresh)) = (changes.as_object_mut(), self.client.tokens().refresh().await) {
                obj.insert("refresh".into(), Value::String(refresh));
            }
        }

        let updated = self.client.patch("users/me/", &changes).await?;

        if updated.get("reauth_required").and_then(Value::as_bool).unwrap_or(false) {
            self.client.force_logout(ReauthReason::PasswordChanged).await;
            self.set_user(None).await;
        } else if let Ok(user) = serde_json::from_value::<CurrentUser>(updated.clone()) {
            self.set_user(Some(user)).await;
        }
        Ok(updated)
    }
}
