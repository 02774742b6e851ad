use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub bind_host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres URL. When unset the server keeps everything in memory.
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub enable_request_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub access_token_minutes: i64,
    pub refresh_token_minutes: i64,
    pub rotate_refresh_tokens: bool,
    pub blacklist_after_rotation: bool,
    pub cookie_domain: Option<String>,
    pub cors_origins: Vec<String>,
    pub enable_audit_logging: bool,
}

/// Settings for the authenticated client (CLI and library users).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub api_url: String,
    pub cookie_mode: bool,
    pub request_timeout_secs: u64,
    pub inactivity_timeout_secs: u64,
    pub activity_recency_secs: u64,
    pub heartbeat_secs: u64,
    pub refresh_skew_secs: u64,
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn activity_recency(&self) -> Duration {
        Duration::from_secs(self.activity_recency_secs)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn refresh_skew(&self) -> Duration {
        Duration::from_secs(self.refresh_skew_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8000/".to_string(),
            cookie_mode: false,
            request_timeout_secs: 10,
            inactivity_timeout_secs: 15 * 60,
            activity_recency_secs: 60,
            heartbeat_secs: 60,
            refresh_skew_secs: 30,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Some(port) = env::var("CAMALEAO_API_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse::<u16>().ok())
        {
            self.server.port = port;
        }
        if let Ok(v) = env::var("CAMALEAO_BIND_HOST") {
            self.server.bind_host = v;
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = if v.trim().is_empty() { None } else { Some(v) };
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // API overrides
        if let Ok(v) = env::var("API_DEFAULT_PAGE_SIZE") {
            self.api.default_page_size = v.parse().unwrap_or(self.api.default_page_size);
        }
        if let Ok(v) = env::var("API_MAX_PAGE_SIZE") {
            self.api.max_page_size = v.parse().unwrap_or(self.api.max_page_size);
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_ACCESS_TOKEN_MINUTES") {
            self.security.access_token_minutes = v.parse().unwrap_or(self.security.access_token_minutes);
        }
        if let Ok(v) = env::var("SECURITY_REFRESH_TOKEN_MINUTES") {
            self.security.refresh_token_minutes = v.parse().unwrap_or(self.security.refresh_token_minutes);
        }
        if let Ok(v) = env::var("SECURITY_ROTATE_REFRESH_TOKENS") {
            self.security.rotate_refresh_tokens = v.parse().unwrap_or(self.security.rotate_refresh_tokens);
        }
        if let Ok(v) = env::var("SECURITY_BLACKLIST_AFTER_ROTATION") {
            self.security.blacklist_after_rotation = v.parse().unwrap_or(self.security.blacklist_after_rotation);
        }
        if let Ok(v) = env::var("COOKIE_DOMAIN") {
            self.security.cookie_domain = if v.trim().is_empty() { None } else { Some(v) };
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        if let Ok(v) = env::var("SECURITY_ENABLE_AUDIT_LOGGING") {
            self.security.enable_audit_logging = v.parse().unwrap_or(self.security.enable_audit_logging);
        }

        // Client overrides
        if let Ok(v) = env::var("API_URL") {
            self.client.api_url = normalize_base_url(&v);
        }
        if let Ok(v) = env::var("JWT_COOKIE") {
            self.client.cookie_mode = v.trim().eq_ignore_ascii_case("true");
        }
        if let Ok(v) = env::var("CLIENT_REQUEST_TIMEOUT_SECS") {
            self.client.request_timeout_secs = v.parse().unwrap_or(self.client.request_timeout_secs);
        }
        if let Ok(v) = env::var("CLIENT_INACTIVITY_TIMEOUT_SECS") {
            self.client.inactivity_timeout_secs = v.parse().unwrap_or(self.client.inactivity_timeout_secs);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                port: 8000,
                bind_host: "127.0.0.1".to_string(),
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 30,
            },
            api: ApiConfig {
                default_page_size: 10,
                max_page_size: 100,
                enable_request_logging: true,
            },
            security: SecurityConfig {
                jwt_secret: "camaleao-dev-secret-change-me".to_string(),
                access_token_minutes: 5,
                refresh_token_minutes: 15,
                rotate_refresh_tokens: true,
                blacklist_after_rotation: true,
                cookie_domain: None,
                cors_origins: vec!["http://localhost:5173".to_string(), "http://127.0.0.1:5173".to_string()],
                enable_audit_logging: true,
            },
            client: ClientConfig::default(),
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                port: 8000,
                bind_host: "0.0.0.0".to_string(),
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                connection_timeout: 10,
            },
            api: ApiConfig {
                default_page_size: 10,
                max_page_size: 100,
                enable_request_logging: true,
            },
            security: SecurityConfig {
                // No default secret outside development: token issuing fails until JWT_SECRET is set
                jwt_secret: String::new(),
                access_token_minutes: 5,
                refresh_token_minutes: 15,
                rotate_refresh_tokens: true,
                blacklist_after_rotation: true,
                cookie_domain: None,
                cors_origins: vec!["https://staging.example.com".to_string()],
                enable_audit_logging: true,
            },
            client: ClientConfig {
                api_url: "https://staging.example.com/api/v1/".to_string(),
                cookie_mode: true,
                ..ClientConfig::default()
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                port: 8000,
                bind_host: "0.0.0.0".to_string(),
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
                connection_timeout: 5,
            },
            api: ApiConfig {
                default_page_size: 10,
                max_page_size: 50,
                enable_request_logging: false,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                access_token_minutes: 5,
                refresh_token_minutes: 15,
                rotate_refresh_tokens: true,
                blacklist_after_rotation: true,
                cookie_domain: None,
                cors_origins: vec!["https://app.example.com".to_string()],
                enable_audit_logging: true,
            },
            client: ClientConfig {
                api_url: "https://app.example.com/api/v1/".to_string(),
                cookie_mode: true,
                ..ClientConfig::default()
            },
        }
    }

    /// Development defaults without reading the environment.
    pub fn for_tests() -> Self {
        Self::development()
    }

    pub fn is_local_host(&self) -> bool {
        matches!(self.server.bind_host.as_str(), "127.0.0.1" | "localhost")
    }
}

/// Ensures a trailing slash so relative endpoint paths join under the base.
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_development {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Development)
    };
}
