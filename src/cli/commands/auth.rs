use clap::Subcommand;
use serde_json::json;

use crate::cli::config::*;
use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::client::claims::decode_unverified;

#[derive(Subcommand)]
pub enum AuthCommands {
    #[command(about = "Login to the current server")]
    Login {
        #[arg(help = "E-mail address")]
        email: String,
        #[arg(long, help = "Password (will prompt if not provided)")]
        password: Option<String>,
    },

    #[command(about = "Logout and forget stored tokens")]
    Logout,

    #[command(about = "Show current authentication status")]
    Status,

    #[command(about = "Refresh the access token now")]
    Refresh,

    #[command(about = "Show current user information")]
    Whoami,
}

pub async fn handle(cmd: AuthCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        AuthCommands::Login { email, password } => {
            let password = match password {
                Some(p) => p,
                None => prompt_line("Password: ")?,
            };

            let session = open_session().await?;
            let user = session.login(&email, &password).await?;

            let mut env_config = load_environment_config()?;
            env_config.current_user = Some(user.email.clone());
            save_environment_config(&env_config)?;

            output_success(
                &output_format,
                &format!("Logged in as {} ({})", user.email, user.role),
                Some(json!({ "user": user })),
            )
        }
        AuthCommands::Logout => {
            let session = open_session().await?;
            session.logout().await?;

            let mut env_config = load_environment_config()?;
            env_config.current_user = None;
            save_environment_config(&env_config)?;

            output_success(&output_format, "Logged out", None)
        }
        AuthCommands::Status => {
            let (server, info) = current_server()?;
            let client = open_client().await?;
            let access = client.tokens().access().await;
            let claims = access.as_deref().and_then(decode_unverified);
            let has_refresh = client.tokens().refresh().await.is_some();

            let status = json!({
                "server": server,
                "url": info.url,
                "authenticated": access.is_some(),
                "email": claims.as_ref().map(|c| c.email.clone()),
                "role": claims.as_ref().map(|c| c.role.clone()),
                "access_expires_at": claims.as_ref().and_then(|c| c.expires_at()),
                "access_expired": claims.as_ref().map(|c| c.is_expired(chrono::Utc::now())),
                "refresh_token_stored": has_refresh,
            });

            match output_format {
                OutputFormat::Json => output_value(&status),
                OutputFormat::Text => {
                    println!("Server: {} ({})", server, info.url);
                    match claims {
                        Some(c) => {
                            println!("User: {} ({})", c.email, c.role);
                            if let Some(exp) = c.expires_at() {
                                let state = if c.is_expired(chrono::Utc::now()) { "expired" } else { "valid" };
                                println!("Access token: {} until {}", state, exp.format("%Y-%m-%d %H:%M:%S UTC"));
                            }
                        }
                        None => println!("Not logged in"),
                    }
                    Ok(())
                }
            }
        }
        AuthCommands::Refresh => {
            let client = open_client().await?;
            let current = client.tokens().access().await;
            client.force_refresh(current.as_deref()).await?;
            output_success(&output_format, "Access token refreshed", None)
        }
        AuthCommands::Whoami => {
            let session = open_session().await?;
            let user = session.refresh_user().await?;
            match output_format {
                OutputFormat::Json => output_value(&serde_json::to_value(&user)?),
                OutputFormat::Text => {
                    println!("{} {} <{}>", user.first_name, user.last_name, user.email);
                    println!("Role: {}", user.role);
                    if let Some(job) = user.job_title.as_deref() {
                        println!("Job title: {}", job);
                    }
                    Ok(())
                }
            }
        }
    }
}
