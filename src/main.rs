use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stockgate::{config::Config, router, services, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");

    let state = AppState::new(&config).await?;
    tracing::info!("✅ AppState initialized");

    match services::roles::seed_predefined(&state).await {
        Ok(created) => tracing::info!("✅ Predefined roles ready ({} created)", created),
        Err(e) => {
            tracing::error!("❌ Failed to seed predefined roles: {}", e);
            return Err(e.into());
        }
    }
    services::roles::ensure_bootstrap_admin(&state).await?;

    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(50)
            .burst_size(200)
            .use_headers()
            .finish()
            .context("Invalid rate limiter configuration")?,
    );

    let app = router(state.clone())?.layer(GovernorLayer::new(governor_conf));

    services::maintenance::spawn(state.clone());
    tracing::info!(
        "✅ Background maintenance job started (runs every {}s)",
        config.maintenance_interval.as_secs()
    );

    let addr = config.bind_addr;
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
