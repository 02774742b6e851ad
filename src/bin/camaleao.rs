use clap::Parser;
use tracing_subscriber::EnvFilter;

use camaleao::cli::utils::output_error;
use camaleao::cli::{Cli, OutputFormat};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_format = OutputFormat::from_cli(&cli);

    if let Err(e) = camaleao::cli::run(cli).await {
        match (std::env::var("CLI_VERBOSE").as_deref(), &output_format) {
            (Ok("true") | Ok("1"), _) => eprintln!("Error: {e:?}"),
            (_, OutputFormat::Json) => output_error(&output_format, &e.to_string(), None)?,
            _ => eprintln!("Error: {e}"),
        }
        std::process::exit(1);
    }

    Ok(())
}
