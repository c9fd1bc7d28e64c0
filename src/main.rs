// Main entry point - Dependency injection and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};
use tracing_subscriber::EnvFilter;

use crate::application::dashboard_service::{DashboardService, DashboardSettings};
use crate::application::events::EventChannel;
use crate::application::series_store::{SeriesStore, SharedStore};
use crate::infrastructure::config::load_panel_config;
use crate::infrastructure::http_client::ScalarHttpClient;
use crate::presentation::app_state::{AppState, NotificationLog};
use crate::presentation::router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = load_panel_config()?;

    // Initialize tracing; RUST_LOG wins over the configured filter
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Create backend client (infrastructure layer)
    let client = Arc::new(ScalarHttpClient::new(
        config.backend.timeout(),
        config.backend.base_url.clone(),
    )?);

    // Create services (application layer)
    let events = EventChannel::default();
    let store = SharedStore::new(SeriesStore::with_default_step(
        config.polling.chart_step_secs,
    ));
    let dashboard = DashboardService::new(
        client,
        store,
        events.clone(),
        DashboardSettings {
            new_file_interval: config.polling.new_file_interval(),
            smoothing_debounce: config.smoothing.debounce(),
        },
    );
    let event_loop = dashboard.spawn_event_loop();

    let notifications = NotificationLog::default();
    let collector = notifications.spawn_collector(&events);

    tracing::info!("Announcing {:?} to the host", dashboard.mounted().event);

    // Create application state
    let state = Arc::new(AppState {
        dashboard: dashboard.clone(),
        notifications,
    });

    // Build router (presentation layer)
    let router = router(state);

    // Start server
    let addr: SocketAddr = config.server.bind.parse()?;
    tracing::info!("Starting scalar panel on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    dashboard.stop_polling();
    event_loop.abort();
    collector.abort();
    Ok(())
}
