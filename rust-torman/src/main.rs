use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rust_torman::api::ApiServer;
use rust_torman::api::server::ApiServerConfig;
use rust_torman::app::AppContext;
use rust_torman::config::AppConfig;
use rust_torman::engine::TransmissionEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_torman=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env_or_default();
    config.ensure_directories().await?;

    let engine = Arc::new(TransmissionEngine::new(config.engine_url.clone())?);
    let context = Arc::new(AppContext::new(config, engine)?);

    let monitor_task = tokio::spawn(context.build_monitor().run());

    let server = ApiServer::new(ApiServerConfig::from_env_or_default(), context.clone());
    let serve = server.run();
    tokio::pin!(serve);

    tokio::select! {
        result = &mut serve => {
            context.teardown().await;
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
            context.teardown().await;
            // The teardown token also stops the server; let it drain.
            serve.await?;
        }
    }

    let _ = monitor_task.await;
    tracing::info!("rust-torman stopped");
    Ok(())
}
