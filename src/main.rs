use std::net::SocketAddr;
use std::sync::Arc;
use futures::FutureExt;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use analysis_service::{
    config::Config,
    db::{self, PgResultStore},
    llm::LLM,
    maintenance::Maintenance,
    routes::create_router,
    storage::ResultStore,
    utils::{init_logger, with_retry},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = init_logger();

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded: {:?}", config.server);

    // Connect to database when one is configured; otherwise results stay in memory
    let pool = match config.database.url.clone() {
        Some(url) => {
            let db_config = config.database.clone();
            let pool = with_retry(
                move || {
                    let url = url.clone();
                    let db_config = db_config.clone();
                    async move { db::create_pool(&url, &db_config).await }.boxed()
                },
                5,
            )
            .await?;

            info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;
            info!("Database migrations completed");
            Some(pool)
        }
        None => {
            warn!("DATABASE_URL not set, results are kept in memory only");
            None
        }
    };

    let max_local = config.analysis.max_local_results;
    let store = match &pool {
        Some(pool) => ResultStore::with_external(Arc::new(PgResultStore::new(pool.clone())), max_local),
        None => ResultStore::local_only(max_local),
    };

    let llm = LLM::new((&config.llm).into())?;
    info!(provider = llm.provider_name(), model = %config.llm.model, "LLM provider ready");

    // Create shared state and background tasks
    let shutdown = CancellationToken::new();
    let (state, queue_handle) = AppState::new(config.clone(), Arc::new(llm), Arc::new(store), pool, &shutdown);

    let maintenance = Maintenance {
        cache: state.cache.clone(),
        statuses: state.queue.statuses().clone(),
        store: state.store.clone(),
        status_retention: config.analysis.status_retention(),
    };
    let maintenance_handle = maintenance.spawn(config.analysis.maintenance_interval(), shutdown.clone());

    // Create router
    let app = create_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Shutting down background tasks");
    shutdown.cancel();
    let _ = queue_handle.await;
    let _ = maintenance_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
