use anyhow::Result;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wmpr_feed::{build_state, create_router, FeedConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = FeedConfig::load()?;
    info!("Loaded configuration: {:?}", config.redacted());

    let bind_address = config.bind_address.clone();
    let state = build_state(config).await?;
    let app = create_router(state);

    // Start server
    let listener = TcpListener::bind(&bind_address).await?;
    let addr = listener.local_addr()?;
    info!("WMPR feed service listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
