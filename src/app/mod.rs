mod config;
mod console;
mod control;
mod error;
mod logging;
mod runtime;

pub mod feed;
pub mod live;
pub mod panel;
pub mod poll;

pub use config::AppConfig;
pub use error::AppError;

/// Runs the monitor panel until Ctrl-C.
pub fn run() -> Result<(), AppError> {
    let config = bootstrap()?;

    tracing::info!(
        base_url = %config.base_url,
        ws_url = %config.ws_url,
        device_id = config.device_id.get(),
        history_limit = config.history_limit.get(),
        feed_capacity = config.feed_capacity.get(),
        poll_interval_ms = config.poll_interval_ms,
        auto_refresh = config.auto_refresh,
        live_on_start = config.live_on_start,
        push_policy = ?config.push_policy,
        "monitor panel bootstrap initialized"
    );

    runtime::run(config)
}

/// Runs one control command (`move`, `obstacle`, `last`, `health`, `history`).
pub fn run_control(args: Vec<String>) -> Result<(), AppError> {
    let config = bootstrap()?;
    let command = control::ControlCommand::parse(&args, config.device_id)?;

    tracing::debug!(?command, base_url = %config.base_url, "control command parsed");

    control::run(config, command)
}

fn bootstrap() -> Result<AppConfig, AppError> {
    let dotenv = dotenvy::dotenv();

    logging::init()?;

    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded environment file"),
        Err(error) if error.not_found() => {}
        Err(error) => return Err(AppError::config(error)),
    }

    AppConfig::from_env()
}
