//! Stock Ledger 服务入口

use std::net::SocketAddr;
use std::sync::Arc;

use reward_adapter_postgres::{create_pool, PostgresConfig};
use reward_config::AppConfig;
use reward_ports::SystemClock;
use reward_telemetry::{init_metrics, init_tracing_with};
use secrecy::ExposeSecret;
use tracing::{info, warn};

use stock_ledger::api::{router, AppState};
use stock_ledger::config::LedgerSettings;
use stock_ledger::infrastructure::persistence::{
    PostgresLedgerUnitOfWorkFactory, PostgresStockReportRepository,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env 不存在时忽略
    dotenvy::dotenv().ok();

    let config = AppConfig::load("config")?;
    init_tracing_with(&config.telemetry.log_level, config.telemetry.json);
    info!(app = %config.app_name, env = %config.app_env, "Starting Stock Ledger");

    let settings = LedgerSettings::from_config(&config.ledger)?;

    let pg_config = PostgresConfig::new(config.database.url.expose_secret().clone())
        .with_max_connections(config.database.max_connections);
    let pool = create_pool(&pg_config).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied");

    let uow_factory = Arc::new(PostgresLedgerUnitOfWorkFactory::new(pool.clone()));
    let reports = Arc::new(PostgresStockReportRepository::new(pool.clone()));
    let mut state = AppState::new(uow_factory, reports, Arc::new(SystemClock), settings)
        .with_pool(pool);

    match init_metrics() {
        Ok(handle) => state = state.with_metrics(handle),
        Err(e) => warn!(error = %e, "Prometheus recorder not installed"),
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!(%addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Stock Ledger stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
