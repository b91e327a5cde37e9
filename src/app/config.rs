use std::num::{NonZeroU32, NonZeroUsize};
use std::str::FromStr;
use std::time::Duration;

use crate::app::AppError;
use crate::app::live::PushPolicy;
use crate::app::panel::PanelSettings;
use crate::domain::feed_store::DEFAULT_FEED_CAPACITY;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5500";
const MONITOR_WS_PATH: &str = "/ws/monitor";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub base_url: String,
    pub ws_url: String,
    pub device_id: NonZeroU32,
    pub client_id: NonZeroU32,
    pub history_limit: NonZeroU32,
    pub feed_capacity: NonZeroUsize,
    pub poll_interval_ms: u64,
    pub auto_refresh: bool,
    pub live_on_start: bool,
    pub push_policy: PushPolicy,
    pub http_timeout_ms: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = non_empty(&lookup, "MONITOR_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let ws_url = match non_empty(&lookup, "MONITOR_WS_URL") {
            Some(url) => url,
            None => derive_ws_url(&base_url)?,
        };

        let poll_interval_ms = parse_or_default(&lookup, "POLL_INTERVAL_MS", 5000_u64)?;
        if poll_interval_ms == 0 {
            return Err(AppError::config("POLL_INTERVAL_MS must be greater than zero"));
        }

        Ok(Self {
            base_url,
            ws_url,
            device_id: parse_non_zero(&lookup, "DEVICE_ID", 1_u32)?,
            client_id: parse_non_zero(&lookup, "CLIENT_ID", 1_u32)?,
            history_limit: parse_non_zero(&lookup, "HISTORY_LIMIT", 10_u32)?,
            feed_capacity: parse_non_zero(&lookup, "FEED_CAPACITY", DEFAULT_FEED_CAPACITY.get())?,
            poll_interval_ms,
            auto_refresh: parse_bool(&lookup, "AUTO_REFRESH", false)?,
            live_on_start: parse_bool(&lookup, "LIVE_ON_START", true)?,
            push_policy: match non_empty(&lookup, "PUSH_POLICY") {
                Some(raw) => raw.parse::<PushPolicy>().map_err(AppError::config)?,
                None => PushPolicy::default(),
            },
            http_timeout_ms: parse_or_default(&lookup, "HTTP_TIMEOUT_MS", 10_000_u64)?,
        })
    }

    pub fn panel_settings(&self) -> PanelSettings {
        PanelSettings {
            device_id: self.device_id,
            history_limit: self.history_limit,
            feed_capacity: self.feed_capacity,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            push_policy: self.push_policy,
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

fn derive_ws_url(base_url: &str) -> Result<String, AppError> {
    let ws_base = if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return Err(AppError::config(
            "MONITOR_BASE_URL must start with http:// or https://",
        ));
    };

    Ok(format!("{ws_base}{MONITOR_WS_PATH}"))
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or_default<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::config(format!("{key} must be a valid number"))),
        None => Ok(default),
    }
}

fn parse_non_zero<T, F>(lookup: &F, key: &str, default: T) -> Result<T::NonZero, AppError>
where
    T: NonZeroTarget,
    F: Fn(&str) -> Option<String>,
{
    let value = parse_or_default(lookup, key, default)?;
    value
        .into_non_zero()
        .ok_or_else(|| AppError::config(format!("{key} must be greater than zero")))
}

trait NonZeroTarget: FromStr + Copy {
    type NonZero;

    fn into_non_zero(self) -> Option<Self::NonZero>;
}

impl NonZeroTarget for u32 {
    type NonZero = NonZeroU32;

    fn into_non_zero(self) -> Option<NonZeroU32> {
        NonZeroU32::new(self)
    }
}

impl NonZeroTarget for usize {
    type NonZero = NonZeroUsize;

    fn into_non_zero(self) -> Option<NonZeroUsize> {
        NonZeroUsize::new(self)
    }
}

fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> Result<bool, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup, key) {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(AppError::config(format!("{key} must be a boolean"))),
        },
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::AppConfig;
    use crate::app::live::PushPolicy;

    #[test]
    fn applies_defaults_for_optional_fields() {
        let config = AppConfig::from_lookup(|_| None).expect("config should be valid");

        assert_eq!(config.base_url, "http://127.0.0.1:5500");
        assert_eq!(config.ws_url, "ws://127.0.0.1:5500/ws/monitor");
        assert_eq!(config.device_id.get(), 1);
        assert_eq!(config.client_id.get(), 1);
        assert_eq!(config.history_limit.get(), 10);
        assert_eq!(config.feed_capacity.get(), 200);
        assert_eq!(config.poll_interval_ms, 5000);
        assert!(!config.auto_refresh);
        assert!(config.live_on_start);
        assert_eq!(config.push_policy, PushPolicy::Drop);
        assert_eq!(config.http_timeout_ms, 10_000);
    }

    #[test]
    fn derives_secure_websocket_url_from_https_base() {
        let config = AppConfig::from_lookup(|key| match key {
            "MONITOR_BASE_URL" => Some("https://rover.example.org/".to_string()),
            _ => None,
        })
        .expect("config should be valid");

        assert_eq!(config.base_url, "https://rover.example.org");
        assert_eq!(config.ws_url, "wss://rover.example.org/ws/monitor");
    }

    #[test]
    fn explicit_websocket_url_wins() {
        let config = AppConfig::from_lookup(|key| match key {
            "MONITOR_WS_URL" => Some("ws://10.0.0.5:9000/live".to_string()),
            "PUSH_POLICY" => Some("Placeholder".to_string()),
            "AUTO_REFRESH" => Some("on".to_string()),
            _ => None,
        })
        .expect("config should be valid");

        assert_eq!(config.ws_url, "ws://10.0.0.5:9000/live");
        assert_eq!(config.push_policy, PushPolicy::Placeholder);
        assert!(config.auto_refresh);
    }

    #[test]
    fn rejects_zero_history_limit() {
        let result = AppConfig::from_lookup(|key| match key {
            "HISTORY_LIMIT" => Some("0".to_string()),
            _ => None,
        });

        assert_eq!(
            result.unwrap_err().to_string(),
            "invalid configuration: HISTORY_LIMIT must be greater than zero"
        );
    }

    #[test]
    fn rejects_invalid_numeric_values() {
        let result = AppConfig::from_lookup(|key| match key {
            "POLL_INTERVAL_MS" => Some("abc".to_string()),
            _ => None,
        });

        assert_eq!(
            result.unwrap_err().to_string(),
            "invalid configuration: POLL_INTERVAL_MS must be a valid number"
        );
    }

    #[test]
    fn rejects_unsupported_base_url_scheme() {
        let result = AppConfig::from_lookup(|key| match key {
            "MONITOR_BASE_URL" => Some("ftp://rover".to_string()),
            _ => None,
        });

        assert!(result.is_err());
    }

    #[test]
    fn rejects_unknown_push_policy() {
        let result = AppConfig::from_lookup(|key| match key {
            "PUSH_POLICY" => Some("keep".to_string()),
            _ => None,
        });

        assert_eq!(
            result.unwrap_err().to_string(),
            "invalid configuration: unknown push policy 'keep'"
        );
    }
}
