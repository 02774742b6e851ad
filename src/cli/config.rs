use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::{ApiClient, AuthMode, FileTokenStore, Session};
use crate::config::{config, normalize_base_url};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub url: String,
    #[serde(default)]
    pub auth_mode: AuthMode,
    #[serde(default)]
    pub description: String,
    pub added_at: DateTime<Utc>,
    pub last_ping: Option<DateTime<Utc>>,
    pub status: ServerStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Up,
    Down,
    Unknown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub servers: BTreeMap<String, ServerInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub current_server: Option<String>,
    /// E-mail of the last successful login, for `auth status`
    pub current_user: Option<String>,
}

impl ServerInfo {
    pub fn new(url: &str, auth_mode: AuthMode, description: String) -> Self {
        Self {
            url: normalize_base_url(url),
            auth_mode,
            description,
            added_at: Utc::now(),
            last_ping: None,
            status: ServerStatus::Unknown,
        }
    }

    pub fn update_ping(&mut self, status: ServerStatus) {
        self.last_ping = Some(Utc::now());
        self.status = status;
    }
}

pub fn get_config_dir() -> anyhow::Result<PathBuf> {
    let config_dir = if let Ok(custom_dir) = std::env::var("CAMALEAO_CLI_CONFIG_DIR") {
        PathBuf::from(custom_dir)
    } else {
        let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("HOME environment variable not set"))?;
        PathBuf::from(home).join(".config").join("camaleao").join("cli")
    };

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

fn load_json<T: Default + for<'de> Deserialize<'de>>(file: &str) -> anyhow::Result<T> {
    let path = get_config_dir()?.join(file);
    if !path.exists() {
        return Ok(T::default());
    }
    let content = fs::read_to_string(&path)?;
    serde_json::from_str(&content).with_context(|| format!("Corrupt CLI config file {}", path.display()))
}

fn save_json<T: Serialize>(file: &str, value: &T) -> anyhow::Result<()> {
    let path = get_config_dir()?.join(file);
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

pub fn load_server_config() -> anyhow::Result<ServerConfig> {
    load_json("server.json")
}

pub fn save_server_config(config: &ServerConfig) -> anyhow::Result<()> {
    save_json("server.json", config)
}

pub fn load_environment_config() -> anyhow::Result<EnvironmentConfig> {
    load_json("env.json")
}

pub fn save_environment_config(config: &EnvironmentConfig) -> anyhow::Result<()> {
    save_json("env.json", config)
}

/// Token file for one registered server
pub fn tokens_path(server_name: &str) -> anyhow::Result<PathBuf> {
    Ok(get_config_dir()?.join("tokens").join(format!("{}.json", server_name)))
}

/// Current server from the registry, or the API URL from the environment
/// when nothing is registered yet
pub fn current_server() -> anyhow::Result<(String, ServerInfo)> {
    let env_config = load_environment_config()?;
    let servers = load_server_config()?;

    if let Some(name) = env_config.current_server {
        let info = servers
            .servers
            .get(&name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Current server '{}' not found in configuration", name))?;
        return Ok((name, info));
    }

    let client = &config().client;
    let mode = if client.cookie_mode { AuthMode::Cookie } else { AuthMode::Header };
    Ok(("default".to_string(), ServerInfo::new(&client.api_url, mode, "From environment".into())))
}

/// Client for the current server with its persisted tokens
pub async fn open_client() -> anyhow::Result<ApiClient> {
    let (name, info) = current_server()?;
    let tokens = FileTokenStore::open(tokens_path(&name)?).await;
    let client = ApiClient::new(&info.url, info.auth_mode, Arc::new(tokens), config().client.request_timeout())?;
    Ok(client)
}

pub async fn open_session() -> anyhow::Result<Session> {
    Ok(Session::new(open_client().await?))
}

pub async fn ping_server(server_info: &ServerInfo) -> ServerStatus {
    let client = reqwest::Client::new();
    let url = format!("{}health", server_info.url);

    match client.get(&url).timeout(std::time::Duration::from_secs(5)).send().await {
        Ok(response) if response.status().is_success() => ServerStatus::Up,
        _ => ServerStatus::Down,
    }
}
