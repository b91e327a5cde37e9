use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::domain::clock::{Clock, SystemClock};
use crate::domain::event_record::{DecodeError, EventRecord, decode_history};
use crate::domain::operation::OperationCode;

/// Fetches a full-replacement history snapshot, newest first.
#[async_trait]
pub trait HistoryLoader: Send + Sync + 'static {
    async fn load_history(
        &self,
        device_id: NonZeroU32,
        limit: NonZeroU32,
    ) -> Result<Vec<EventRecord>, ApiError>;
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("network error: {message}")]
    Network { message: String },
    #[error("backend returned status {status}{}", body_suffix(.body))]
    Backend {
        status: u16,
        body: Option<ResponseBody>,
    },
    #[error("failed to decode response: {0}")]
    Decode(#[from] DecodeError),
}

/// Best-effort decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

impl ResponseBody {
    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return None;
        }

        match serde_json::from_slice(bytes) {
            Ok(value) => Some(ResponseBody::Json(value)),
            Err(_) => Some(ResponseBody::Text(
                String::from_utf8_lossy(bytes).trim().to_string(),
            )),
        }
    }
}

impl fmt::Display for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Json(value) => write!(f, "{value}"),
            ResponseBody::Text(text) => f.write_str(text),
        }
    }
}

fn body_suffix(body: &Option<ResponseBody>) -> String {
    body.as_ref()
        .map(|body| format!(": {body}"))
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq)]
pub enum HealthStatus {
    Reachable,
    Unreachable {
        status: u16,
        body: Option<ResponseBody>,
    },
}

#[derive(Debug, Serialize, PartialEq)]
struct MoveCommand {
    id_dispositivo: u32,
    id_cliente: u32,
    id_operacion: i64,
    id_obstaculo: Option<i64>,
}

#[derive(Debug, Serialize, PartialEq)]
struct ObstacleCommand {
    id_dispositivo: u32,
    id_cliente: u32,
    id_obstaculo: i64,
}

#[derive(Clone)]
pub struct DeviceApiClient {
    http: reqwest::Client,
    base_url: String,
    client_id: NonZeroU32,
    clock: Arc<dyn Clock>,
}

impl DeviceApiClient {
    pub fn new(base_url: &str, client_id: NonZeroU32, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::Client)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn send_move(
        &self,
        device_id: NonZeroU32,
        operation: OperationCode,
        obstacle: Option<i64>,
    ) -> Result<Option<ResponseBody>, ApiError> {
        let command = MoveCommand {
            id_dispositivo: device_id.get(),
            id_cliente: self.client_id.get(),
            id_operacion: operation.code(),
            id_obstaculo: obstacle,
        };

        tracing::debug!(
            device_id = device_id.get(),
            operation = %operation,
            ?obstacle,
            "submitting move"
        );
        self.expect_success(self.http.post(self.url("/api/move")).json(&command))
            .await
    }

    pub async fn send_obstacle(
        &self,
        device_id: NonZeroU32,
        obstacle: i64,
    ) -> Result<Option<ResponseBody>, ApiError> {
        let command = ObstacleCommand {
            id_dispositivo: device_id.get(),
            id_cliente: self.client_id.get(),
            id_obstaculo: obstacle,
        };

        tracing::debug!(device_id = device_id.get(), obstacle, "submitting obstacle");
        self.expect_success(self.http.post(self.url("/api/obstaculo")).json(&command))
            .await
    }

    pub async fn last_event(&self, device_id: NonZeroU32) -> Result<Option<ResponseBody>, ApiError> {
        self.expect_success(self.http.get(self.url(&format!("/api/last/{device_id}"))))
            .await
    }

    pub async fn check_health(&self) -> Result<HealthStatus, ApiError> {
        let (status, body) = self.execute(self.http.get(self.url("/health"))).await?;

        if status.is_success() {
            Ok(HealthStatus::Reachable)
        } else {
            Ok(HealthStatus::Unreachable {
                status: status.as_u16(),
                body,
            })
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn expect_success(
        &self,
        request: RequestBuilder,
    ) -> Result<Option<ResponseBody>, ApiError> {
        let (status, body) = self.execute(request).await?;

        if !status.is_success() {
            return Err(ApiError::Backend {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }

    async fn execute(
        &self,
        request: RequestBuilder,
    ) -> Result<(StatusCode, Option<ResponseBody>), ApiError> {
        let response = request.send().await.map_err(network_error)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(network_error)?;

        Ok((status, ResponseBody::from_bytes(&bytes)))
    }
}

#[async_trait]
impl HistoryLoader for DeviceApiClient {
    async fn load_history(
        &self,
        device_id: NonZeroU32,
        limit: NonZeroU32,
    ) -> Result<Vec<EventRecord>, ApiError> {
        let request = self
            .http
            .get(self.url(&format!("/api/events/{device_id}")))
            .query(&[("n", limit.get())]);

        let mut records = match self.expect_success(request).await? {
            Some(ResponseBody::Json(payload)) => decode_history(&payload, self.clock.as_ref())?,
            Some(ResponseBody::Text(text)) => {
                return Err(DecodeError::InvalidJson(text).into());
            }
            None => return Err(DecodeError::InvalidJson("empty response body".to_string()).into()),
        };

        let limit = limit.get() as usize;
        if records.len() > limit {
            tracing::warn!(
                received = records.len(),
                limit,
                "backend returned more events than requested"
            );
            records.truncate(limit);
        }

        tracing::debug!(
            device_id = device_id.get(),
            count = records.len(),
            "history loaded"
        );
        Ok(records)
    }
}

fn network_error(error: reqwest::Error) -> ApiError {
    ApiError::Network {
        message: error.to_string(),
    }
}
