pub mod commands;
pub mod config;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "camaleao")]
#[command(about = "Camaleão CLI - LGPD compliance management from the terminal")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "API server registry")]
    Server {
        #[command(subcommand)]
        cmd: commands::server::ServerCommands,
    },

    #[command(about = "Authentication and token management")]
    Auth {
        #[command(subcommand)]
        cmd: commands::auth::AuthCommands,
    },

    #[command(about = "Compliance records (inventarios, riscos, planos-acao, ...)")]
    Data {
        #[command(subcommand)]
        cmd: commands::data::DataCommands,
    },

    #[command(about = "Compliance dashboard")]
    Dashboard {
        #[arg(long, help = "Users in the access ranking")]
        limit: Option<usize>,
    },

    #[command(about = "Interactive session with inactivity logout")]
    Shell,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Server { cmd } => commands::server::handle(cmd, output_format).await,
        Commands::Auth { cmd } => commands::auth::handle(cmd, output_format).await,
        Commands::Data { cmd } => commands::data::handle(cmd, output_format).await,
        Commands::Dashboard { limit } => commands::dashboard::handle(limit, output_format).await,
        Commands::Shell => commands::shell::handle(output_format).await,
    }
}
