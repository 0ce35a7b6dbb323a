use std::sync::Arc;
use std::time::Duration;

use thingy_monitor::domain::settings::SettingsService;
use thingy_monitor::infrastructure::bluetooth::connection::{BtleplugTransport, ConnectionConfig};
use thingy_monitor::infrastructure::bluetooth::{SessionConfig, SessionOrchestrator};
use thingy_monitor::infrastructure::logging;
use thingy_monitor::infrastructure::persistence::{JsonLinesSink, ReadingSink, TracingSink};
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load env before reading settings
    let _ = dotenvy::dotenv();

    let settings_service = SettingsService::new()?;
    let mut settings = settings_service.get().clone();
    settings.apply_env();

    let _log_guard = logging::init_logger(&settings.log_settings)?;
    if let Some(reason) = settings_service.load_error() {
        warn!("Settings file ignored, running on defaults: {}", reason);
    }
    info!(
        address = %settings.device_address,
        settings = %settings_service.path().display(),
        "Thingy monitor starting"
    );

    let config = SessionConfig::from_settings(&settings)?;

    let sink: Arc<dyn ReadingSink> = match &settings.sink.json_lines_path {
        Some(path) => Arc::new(JsonLinesSink::open(path)?),
        None => Arc::new(TracingSink),
    };

    let transport = BtleplugTransport::new(ConnectionConfig {
        scan_timeout: Duration::from_secs(settings.scan_timeout_secs),
        link_timeout: Duration::from_secs(settings.link_timeout_secs),
        notification_queue_capacity: settings.notification_queue_capacity,
    })
    .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    let orchestrator = SessionOrchestrator::new(transport, config, sink);
    orchestrator.run(shutdown_rx).await?;

    info!("Thingy monitor stopped");
    Ok(())
}
