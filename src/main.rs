use anyhow::Context;
use spendwarden::orchestration::run_periodic;
use spendwarden::{
    api, config::Config, db::init_db, IndexerDataSource, ReconcileSettings, Reconciler,
    Repository,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("configuration error")?;
    let port = config.port;

    let pool = init_db(&config.database_path)
        .await
        .context("failed to initialize reference store")?;

    let repo = Arc::new(Repository::new(pool));
    let indexer = Arc::new(IndexerDataSource::new(config.indexer_api_url.clone()));
    let reconciler = Arc::new(Reconciler::new(
        indexer.clone(),
        indexer.clone(),
        repo.clone(),
        repo.clone(),
        indexer,
        ReconcileSettings::from(&config),
    ));

    if config.sweep_interval_secs > 0 {
        tokio::spawn(run_periodic(
            reconciler.clone(),
            Duration::from_secs(config.sweep_interval_secs),
            config.sweep_concurrency,
        ));
        tracing::info!(
            "Sweeping all accounts every {}s (concurrency {})",
            config.sweep_interval_secs,
            config.sweep_concurrency
        );
    }

    let app = api::create_router(api::AppState::new(repo, reconciler));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
