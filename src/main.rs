use tracing_subscriber::EnvFilter;

use camaleao::config::config;
use camaleao::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before the config singleton reads the environment
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("camaleao=info,tower_http=info")),
        )
        .init();

    let config = config();
    tracing::info!("Starting Camaleão API in {:?} mode", config.environment);

    server::serve(config.clone()).await
}
