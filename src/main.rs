use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use babelcast::config::Config;
use babelcast::server::Relay;
use babelcast::status;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("babelcast=info".parse()?),
        )
        .init();

    info!("Starting babelcast relay");

    // Load configuration from environment
    let config = Arc::new(Config::from_env()?);
    info!(target_language = %config.target_language, "Target language configured");

    let relay = Relay::new(Arc::clone(&config));
    let listener = relay.listen().await?;
    info!(addr = %config.bind_addr, "Relay listening");

    // Status endpoint runs on its own listener, read-only over the registry.
    let registry = relay.registry();
    let status_addr = config.status_bind_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = status::serve(registry, &status_addr).await {
            error!(error = %e, "status server exited");
        }
    });

    relay.run(listener).await;
    Ok(())
}
