use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cascade_notify::{config::Config, worker, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_new(&config.log_level)
                .unwrap_or_else(|_| "cascade_notify=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting cascade-notify-worker");

    let state = Arc::new(AppState::build(config).await?);
    let consumer_id = format!("worker-{}", uuid::Uuid::new_v4());

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = ?e, "failed to install ctrl-c handler");
            return;
        }
        tracing::info!("received shutdown signal");
        let _ = shutdown_tx.send(());
    });

    worker::run(state, consumer_id, shutdown_rx).await;

    Ok(())
}
