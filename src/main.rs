use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use live_news::config::Config;
use live_news::fetcher::FeedFetcher;
use live_news::ingest::{start_background_ingest, Ingestor};
use live_news::news::NewsService;
use live_news::normalizer::Normalizer;
use live_news::routes::{self, AppState};
use live_news::store::{open_store, NewsStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "live_news=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path =
        std::env::var("LIVE_NEWS_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let mut config = Config::load(&config_path)?;
    if let Ok(url) = std::env::var("DATABASE_URL") {
        config.store.database_url = url;
    }
    if let Ok(url) = std::env::var("KV_REST_API_URL") {
        config.store.rest_url = Some(url);
    }
    if let Ok(token) = std::env::var("KV_REST_API_TOKEN") {
        config.store.rest_token = Some(token);
    }
    config.validate()?;
    info!("Loaded configuration from {} (feed: {})", config_path, config.feed.url);

    // Initialize store
    let kv = open_store(&config.store).await?;
    let store = NewsStore::new(kv, &config.store.namespace);
    info!("Store ready with {} records", store.count().await?);

    let ingestor = Arc::new(Ingestor::new(
        FeedFetcher::new(&config.feed)?,
        Normalizer::new(config.feed.source.clone()),
        store.clone(),
    ));

    // Start periodic ingestion if configured
    if let Some(interval) = config.refresh_interval {
        let bg_ingestor = ingestor.clone();
        tokio::spawn(async move {
            start_background_ingest(bg_ingestor, interval).await;
        });
    }

    let state = Arc::new(AppState {
        news: NewsService::new(store, config.feed.source.clone()),
        ingestor,
    });
    let app = routes::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!("Server starting on http://{}", config.listen_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
