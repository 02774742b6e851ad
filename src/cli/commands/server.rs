use clap::Subcommand;
use serde_json::json;

use crate::cli::config::*;
use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::client::AuthMode;

#[derive(Subcommand)]
pub enum ServerCommands {
    #[command(about = "Register an API server")]
    Add {
        #[arg(help = "Server name")]
        name: String,
        #[arg(help = "API base URL, e.g. http://127.0.0.1:8000/")]
        url: String,
        #[arg(long, help = "Keep the refresh token in an httpOnly cookie")]
        cookie: bool,
        #[arg(long, default_value = "", help = "Free-form description")]
        description: String,
    },

    #[command(about = "List registered servers")]
    List,

    #[command(about = "Show currently selected server")]
    Current,

    #[command(about = "Switch to a registered server")]
    Use {
        #[arg(help = "Server name to switch to")]
        name: String,
    },

    #[command(about = "Remove server from registry")]
    Delete {
        #[arg(help = "Server name to delete")]
        name: String,
    },

    #[command(about = "Health check a server (defaults to current server)")]
    Ping {
        #[arg(help = "Server name to ping")]
        name: Option<String>,
    },
}

fn mode_label(mode: AuthMode) -> &'static str {
    match mode {
        AuthMode::Header => "header",
        AuthMode::Cookie => "cookie",
    }
}

pub async fn handle(cmd: ServerCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        ServerCommands::Add { name, url, cookie, description } => {
            let mut config = load_server_config()?;
            if config.servers.contains_key(&name) {
                return Err(anyhow::anyhow!("Server '{}' already exists", name));
            }
            url::Url::parse(&url).map_err(|e| anyhow::anyhow!("Invalid server URL '{}': {}", url, e))?;

            let mode = if cookie { AuthMode::Cookie } else { AuthMode::Header };
            let info = ServerInfo::new(&url, mode, description);
            let normalized = info.url.clone();
            config.servers.insert(name.clone(), info);
            save_server_config(&config)?;

            // The first registered server becomes current
            let mut env_config = load_environment_config()?;
            if env_config.current_server.is_none() {
                env_config.current_server = Some(name.clone());
                save_environment_config(&env_config)?;
            }

            output_success(
                &output_format,
                &format!("Server '{}' added ({})", name, normalized),
                Some(json!({ "server": name, "url": normalized, "auth_mode": mode_label(mode) })),
            )
        }
        ServerCommands::List => {
            let config = load_server_config()?;
            let env_config = load_environment_config()?;

            if config.servers.is_empty() {
                return output_empty_collection(&output_format, "servers", "No servers configured");
            }

            match output_format {
                OutputFormat::Json => {
                    let servers: Vec<_> = config
                        .servers
                        .iter()
                        .map(|(name, info)| {
                            json!({
                                "name": name,
                                "url": info.url,
                                "auth_mode": mode_label(info.auth_mode),
                                "status": info.status,
                                "last_ping": info.last_ping,
                                "current": env_config.current_server.as_ref() == Some(name)
                            })
                        })
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&json!({ "servers": servers }))?);
                }
                OutputFormat::Text => {
                    println!("{:<15} {:<40} {:<8} {:<8} {}", "NAME", "URL", "AUTH", "STATUS", "DESCRIPTION");
                    println!("{}", "-".repeat(90));
                    for (name, info) in &config.servers {
                        let marker = if env_config.current_server.as_ref() == Some(name) { "*" } else { " " };
                        let status = match info.status {
                            ServerStatus::Up => "up",
                            ServerStatus::Down => "down",
                            ServerStatus::Unknown => "unknown",
                        };
                        println!(
                            "{}{:<14} {:<40} {:<8} {:<8} {}",
                            marker,
                            name,
                            info.url,
                            mode_label(info.auth_mode),
                            status,
                            info.description
                        );
                    }
                }
            }
            Ok(())
        }
        ServerCommands::Current => {
            let env_config = load_environment_config()?;
            match env_config.current_server {
                Some(name) => {
                    let config = load_server_config()?;
                    let info = config
                        .servers
                        .get(&name)
                        .ok_or_else(|| anyhow::anyhow!("Current server '{}' not found in configuration", name))?;
                    let details = json!({
                        "name": name,
                        "url": info.url,
                        "auth_mode": mode_label(info.auth_mode),
                        "description": info.description
                    });
                    output_current_item(&output_format, "server", &name, details)
                }
                None => output_no_current_item(&output_format, "server"),
            }
        }
        ServerCommands::Use { name } => switch_current_item(
            &name,
            "server",
            |name| Ok(load_server_config()?.servers.contains_key(name)),
            |name| {
                let mut env_config = load_environment_config()?;
                env_config.current_server = Some(name.to_string());
                env_config.current_user = None;
                save_environment_config(&env_config)
            },
            &output_format,
        ),
        ServerCommands::Delete { name } => delete_item_with_current_check(
            &name,
            "server",
            |name| Ok(load_server_config()?.servers.contains_key(name)),
            |name| {
                let mut config = load_server_config()?;
                config.servers.remove(name);
                save_server_config(&config)?;
                let tokens = tokens_path(name)?;
                if tokens.exists() {
                    std::fs::remove_file(tokens)?;
                }
                Ok(())
            },
            |name| {
                let mut env_config = load_environment_config()?;
                if env_config.current_server.as_deref() == Some(name) {
                    env_config.current_server = None;
                    env_config.current_user = None;
                    save_environment_config(&env_config)?;
                }
                Ok(())
            },
            &output_format,
        ),
        ServerCommands::Ping { name } => {
            let mut config = load_server_config()?;
            let target = match name {
                Some(name) => name,
                None => load_environment_config()?
                    .current_server
                    .ok_or_else(|| anyhow::anyhow!("No current server set"))?,
            };
            let info = config
                .servers
                .get_mut(&target)
                .ok_or_else(|| anyhow::anyhow!("Server '{}' not found", target))?;

            let status = ping_server(info).await;
            info.update_ping(status);
            let url = info.url.clone();
            save_server_config(&config)?;

            match status {
                ServerStatus::Up => output_success(
                    &output_format,
                    &format!("Server '{}' is up ({})", target, url),
                    Some(json!({ "server": target, "status": status })),
                ),
                _ => {
                    output_error(&output_format, &format!("Server '{}' is unreachable ({})", target, url), Some("SERVER_DOWN"))?;
                    Err(anyhow::anyhow!("Server '{}' did not answer the health check", target))
                }
            }
        }
    }
}
