// Support desk entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, not terminal)
// 2. Load config
// 3. Build the REST client
// 4. Create mpsc channels
// 5. Spawn the hub supervisor
// 6. Spawn the app loop
// 7. Run the TUI until the user quits
// 8. Cleanup on exit

use std::sync::Arc;
use std::time::Duration;

use support_desk::api::ChatApi;
use support_desk::app;
use support_desk::config;
use support_desk::hub::client::SupervisorSettings;
use support_desk::hub::{self, HubClient, TungsteniteConnector};
use support_desk::tui;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Support desk starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: hub={}, api={}, agent={}",
        config.hub.url, config.api.base_url, config.agent.display_name
    );
    if config.credentials.access_token.is_none() {
        info!("No access token configured; connecting anonymously");
    }

    // 3. REST client
    let backend = ChatApi::from_config(&config).context("failed to build API client")?;

    // 4. Channels
    let (hub_cmd_tx, hub_cmd_rx) = mpsc::channel(64);
    let (hub_tx, hub_rx) = mpsc::channel(256);
    let (api_tx, api_rx) = mpsc::channel(256);
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (ui_tx, ui_rx) = mpsc::channel(256);

    let hub_client = HubClient::new(hub_cmd_tx, config.hub.invocation_timeout());

    // 5. Hub supervisor: connects, keeps alive, reconnects.
    let connector =
        TungsteniteConnector::from_config(&config).context("Failed to build hub connector")?;
    let settings = SupervisorSettings::from_config(&config);
    let hub_handle = tokio::spawn(hub::run_supervisor(connector, settings, hub_cmd_rx, hub_tx));

    // 6. App loop
    let view_state = tui::ViewState::new(
        config.agent.display_name.clone(),
        config.notifications.bell,
    );
    let app_state = app::AppState::new(config, hub_client, Arc::new(backend), api_tx);
    let app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(hub_rx, api_rx, cmd_rx, ui_tx, app_state).await {
            error!("Application loop error: {}", e);
        }
    });

    // 7. TUI (blocks until the user quits)
    info!("Application ready");
    if let Err(e) = tui::run(ui_rx, cmd_tx, view_state).await {
        error!("TUI error: {}", e);
    }

    // 8. Cleanup: the app loop stops the supervisor on its way out.
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = app_handle.await;
        let _ = hub_handle.await;
    })
    .await;

    info!("Support desk shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to a file (not the terminal, which is used by the TUI).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("support-desk.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("support_desk=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
