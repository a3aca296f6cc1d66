use std::sync::Arc;

use bedrock_control::{config::ControlConfig, metadata::DbMetadata, routes, state::AppState};
use bedrock_supervisor::{Supervisor, SupervisorConfig};
use sea_orm_migration::MigratorTrait;

async fn init_state(config: ControlConfig) -> anyhow::Result<AppState> {
    let db = Arc::new(bedrock_db::connect(&config.database_url).await?);

    // Apply migrations on boot (idempotent).
    bedrock_migration::Migrator::up(&*db, None).await?;

    let supervisor = Supervisor::new(
        SupervisorConfig::from_env(),
        Arc::new(DbMetadata::new(db.clone())),
    );
    tracing::info!(
        data_root = %supervisor.config().data_root.display(),
        server_binary = %supervisor.config().server_binary.display(),
        "supervisor configured"
    );

    Ok(AppState {
        db,
        supervisor,
        config: Arc::new(config),
    })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ControlConfig::from_env()?;
    let addr = config.listen;
    let state = init_state(config).await?;
    let supervisor = state.supervisor.clone();

    let app = routes::router(state);
    tracing::info!(%addr, "bedrock-control HTTP listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutting down running worlds");
    supervisor.shutdown_all().await;
    Ok(())
}
