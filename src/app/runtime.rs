use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::adapters::device_api::{DeviceApiClient, HistoryLoader};
use crate::adapters::monitor_ws::{Connector, WsConnector};
use crate::adapters::terminal::render_notification;
use crate::app::config::AppConfig;
use crate::app::console::{HELP, PanelCommand};
use crate::app::error::AppError;
use crate::app::feed::{FeedNotification, Notifier};
use crate::app::panel::MonitorPanel;
use crate::domain::clock::SystemClock;
use crate::domain::connection_state::ConnectionState;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);
// a pending stdin read cannot be cancelled, so runtime teardown does not wait for it
const RUNTIME_TEARDOWN: Duration = Duration::from_millis(200);

pub fn run(config: AppConfig) -> Result<(), AppError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(AppError::runtime)?;

    let result = runtime.block_on(run_panel(config));
    runtime.shutdown_timeout(RUNTIME_TEARDOWN);
    result
}

async fn run_panel(config: AppConfig) -> Result<(), AppError> {
    let (notifier, mut notifications) = Notifier::channel();

    let api = DeviceApiClient::new(&config.base_url, config.client_id, config.http_timeout())
        .map_err(AppError::runtime)?;
    let connector = WsConnector::new(&config.ws_url).map_err(AppError::runtime)?;
    let mut panel = MonitorPanel::new(
        Arc::new(api),
        connector,
        config.panel_settings(),
        notifier,
        Arc::new(SystemClock),
    );

    if let Err(error) = panel.load_history().await {
        tracing::warn!(error = %error, "initial history load failed");
        println!("!! {error}");
    }
    if config.live_on_start {
        panel.connect_live();
    }
    if config.auto_refresh {
        panel.start_auto_refresh();
    }
    println!("{HELP}");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut input_open = true;

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                if let Err(error) = signal {
                    tracing::warn!(error = %error, "failed to listen for ctrl-c");
                }
                tracing::info!("shutdown requested");
                break;
            }
            line = input.next_line(), if input_open => match line {
                Ok(Some(line)) => match PanelCommand::parse(&line) {
                    Ok(Some(command)) => {
                        if apply_command(&mut panel, command).await.is_break() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(error) => println!("{error}"),
                },
                Ok(None) => {
                    tracing::debug!("stdin closed, panel keeps running until ctrl-c");
                    input_open = false;
                }
                Err(error) => {
                    tracing::warn!(error = %error, "failed to read stdin");
                    input_open = false;
                }
            },
            notification = notifications.recv() => match notification {
                Some(notification) => print_notification(&notification),
                None => break,
            }
        }
    }

    let live_active = panel.connection_state() != ConnectionState::Disconnected;
    panel.shutdown();

    if live_active {
        wait_for_disconnect(&mut notifications).await;
    }

    Ok(())
}

/// Runs one console command against the panel. `Break` ends the session.
async fn apply_command<L, C>(
    panel: &mut MonitorPanel<L, C>,
    command: PanelCommand,
) -> ControlFlow<()>
where
    L: HistoryLoader,
    C: Connector,
{
    tracing::debug!(?command, "console command");

    match command {
        PanelCommand::Load => {
            if let Err(error) = panel.load_history().await {
                tracing::warn!(error = %error, "history reload failed");
                println!("!! {error}");
            }
        }
        PanelCommand::Clear => {
            if let Err(error) = panel.clear() {
                tracing::error!(error = %error, "failed to clear feed");
            }
        }
        PanelCommand::ToggleLive => panel.toggle_live(),
        PanelCommand::ToggleAutoRefresh => {
            if panel.auto_refresh_running() {
                panel.stop_auto_refresh();
                println!("-- auto refresh off --");
            } else if panel.start_auto_refresh() {
                println!(
                    "-- auto refresh every {} ms --",
                    panel.settings().poll_interval.as_millis()
                );
            }
        }
        PanelCommand::Help => println!("{HELP}"),
        PanelCommand::Quit => return ControlFlow::Break(()),
    }

    ControlFlow::Continue(())
}

async fn wait_for_disconnect(notifications: &mut UnboundedReceiver<FeedNotification>) {
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while let Some(notification) = notifications.recv().await {
            print_notification(&notification);
            if notification == FeedNotification::ConnectionChanged(ConnectionState::Disconnected) {
                break;
            }
        }
    })
    .await;

    if drained.is_err() {
        tracing::warn!("websocket did not confirm close before shutdown");
    }
}

fn print_notification(notification: &FeedNotification) {
    for line in render_notification(notification) {
        println!("{line}");
    }
}
