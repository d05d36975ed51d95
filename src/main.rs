use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use market_wire::aggregator::Aggregator;
use market_wire::config::Config;
use market_wire::display::NewsBoard;
use market_wire::fetcher::HttpFetcher;
use market_wire::refresh::{spawn_refresh_loop, Refresher};
use market_wire::routes::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "market_wire=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load("feeds.toml")?;
    info!(
        feeds = config.feeds.len(),
        mode = ?config.mode,
        interval_secs = config.refresh_interval_secs,
        "Loaded configuration"
    );

    // Wire the aggregation cycle to the board
    let fetcher = Arc::new(HttpFetcher::new(config.request_timeout())?);
    let aggregator = Aggregator::from_config(fetcher, &config);
    let board = Arc::new(NewsBoard::new());
    let refresher = Arc::new(Refresher::new(
        aggregator,
        board.clone(),
        config.local_offset(),
    ));

    // Start background refresh task
    let refresh_handle = spawn_refresh_loop(refresher.clone(), config.refresh_interval());

    let state = Arc::new(AppState {
        board,
        refresher,
        local_offset: config.local_offset(),
    });
    let app = routes::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!("Server starting on http://{}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    refresh_handle.shutdown().await;
    Ok(())
}
