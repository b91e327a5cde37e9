use std::num::NonZeroU32;

use crate::adapters::device_api::{DeviceApiClient, HealthStatus, HistoryLoader, ResponseBody};
use crate::adapters::terminal::{render_count, render_record};
use crate::app::config::AppConfig;
use crate::app::error::AppError;
use crate::domain::operation::OperationCode;

const USAGE: &str =
    "usage: monitor_control <move <op> [obstacle] | obstacle <id> | last [device] | health | history [n]>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Move {
        operation: OperationCode,
        obstacle: Option<i64>,
    },
    Obstacle(i64),
    Last(NonZeroU32),
    Health,
    /// `None` falls back to the configured history limit.
    History(Option<NonZeroU32>),
}

impl ControlCommand {
    /// `default_device` is used by `last` when no device id is given.
    pub fn parse(args: &[String], default_device: NonZeroU32) -> Result<Self, AppError> {
        let Some((name, rest)) = args.split_first() else {
            return Err(AppError::usage(USAGE));
        };

        let command = match (name.as_str(), rest) {
            ("move", [operation]) => ControlCommand::Move {
                operation: operation.parse().map_err(AppError::usage)?,
                obstacle: None,
            },
            ("move", [operation, obstacle]) => ControlCommand::Move {
                operation: operation.parse().map_err(AppError::usage)?,
                obstacle: Some(parse_obstacle(obstacle)?),
            },
            ("obstacle", [obstacle]) => ControlCommand::Obstacle(parse_obstacle(obstacle)?),
            ("last", []) => ControlCommand::Last(default_device),
            ("last", [device]) => ControlCommand::Last(parse_positive(device, "device id")?),
            ("health", []) => ControlCommand::Health,
            ("history", []) => ControlCommand::History(None),
            ("history", [limit]) => {
                ControlCommand::History(Some(parse_positive(limit, "history size")?))
            }
            _ => return Err(AppError::usage(USAGE)),
        };

        Ok(command)
    }
}

fn parse_obstacle(raw: &str) -> Result<i64, AppError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| AppError::usage(format!("obstacle id must be an integer, got '{raw}'")))
}

fn parse_positive(raw: &str, what: &str) -> Result<NonZeroU32, AppError> {
    raw.trim()
        .parse::<NonZeroU32>()
        .map_err(|_| AppError::usage(format!("{what} must be a positive integer, got '{raw}'")))
}

pub fn run(config: AppConfig, command: ControlCommand) -> Result<(), AppError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(AppError::runtime)?;

    runtime.block_on(execute(config, command))
}

async fn execute(config: AppConfig, command: ControlCommand) -> Result<(), AppError> {
    let api = DeviceApiClient::new(&config.base_url, config.client_id, config.http_timeout())
        .map_err(AppError::runtime)?;
    let device_id = config.device_id;

    match command {
        ControlCommand::Move {
            operation,
            obstacle,
        } => {
            let body = api
                .send_move(device_id, operation, obstacle)
                .await
                .map_err(AppError::runtime)?;
            tracing::info!(device_id = device_id.get(), operation = %operation, "move accepted");
            print_body(body)?;
        }
        ControlCommand::Obstacle(obstacle) => {
            let body = api
                .send_obstacle(device_id, obstacle)
                .await
                .map_err(AppError::runtime)?;
            tracing::info!(device_id = device_id.get(), obstacle, "obstacle accepted");
            print_body(body)?;
        }
        ControlCommand::Last(device) => {
            let body = api.last_event(device).await.map_err(AppError::runtime)?;
            print_body(body)?;
        }
        ControlCommand::Health => match api.check_health().await.map_err(AppError::runtime)? {
            HealthStatus::Reachable => println!("backend reachable at {}", api.base_url()),
            HealthStatus::Unreachable { status, body } => {
                return Err(AppError::runtime(format!(
                    "backend unhealthy (status {status}){}",
                    body.map(|body| format!(": {body}")).unwrap_or_default()
                )));
            }
        },
        ControlCommand::History(limit) => {
            let limit = limit.unwrap_or(config.history_limit);
            let records = api
                .load_history(device_id, limit)
                .await
                .map_err(AppError::runtime)?;
            println!("{}", render_count(records.len() as u64));
            for record in &records {
                println!("{}", render_record(record));
            }
        }
    }

    Ok(())
}

fn print_body(body: Option<ResponseBody>) -> Result<(), AppError> {
    match body {
        Some(ResponseBody::Json(value)) => {
            let pretty = serde_json::to_string_pretty(&value).map_err(AppError::runtime)?;
            println!("{pretty}");
        }
        Some(ResponseBody::Text(text)) => println!("{text}"),
        None => println!("ok"),
    }
    Ok(())
}
