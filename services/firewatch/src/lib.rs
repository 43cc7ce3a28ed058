//! Firewatch - fire detector telemetry service
//!
//! Subscribes to detector telemetry on an MQTT broker, keeps the latest reading
//! per device, mirrors it to disk, and serves cards and a map on a dashboard.
//! Also carries a client for the device/user management backend.

pub mod api;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod export;
pub mod io;
pub mod persistence;
pub mod projector;
pub mod reading;
pub mod session;
pub mod state;
pub mod store;
pub mod transport;

pub use config::{load_config, Config};
pub use error::{FirewatchError, Result};
pub use session::{SessionBuilder, TelemetryEvent, TelemetrySession};

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::projector::Projector;

/// Run the telemetry session and dashboard until ctrl-c
pub async fn run(config: Config) -> Result<()> {
    let cancel = CancellationToken::new();
    let mut session = SessionBuilder::new(config.clone())
        .with_cancellation_token(cancel.clone())
        .build()
        .await?;

    // Setup shutdown handler
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!("Failed to listen for ctrl-c: {}", e),
        }
        cancel_for_signal.cancel();
    });

    session.start().await?;

    let dashboard = if config.dashboard.enabled {
        let dashboard_port = config.dashboard.port;
        let router = dashboard::build_router(
            session.state(),
            Arc::new(Projector::from_config(&config)),
        );
        let cancel_for_dashboard = cancel.clone();

        Some(tokio::spawn(async move {
            let addr = SocketAddr::from(([0, 0, 0, 0], dashboard_port));
            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(e) => {
                    tracing::error!(
                        "Failed to bind dashboard to port {}: {}. Continuing without dashboard.",
                        dashboard_port,
                        e
                    );
                    return;
                }
            };
            tracing::info!("Dashboard listening on http://{}", addr);

            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    cancel_for_dashboard.cancelled().await;
                })
                .await
                .ok();

            tracing::debug!("Dashboard stopped");
        }))
    } else {
        None
    };

    cancel.cancelled().await;
    session.shutdown().await;
    if let Some(dashboard) = dashboard {
        let _ = dashboard.await;
    }

    Ok(())
}
