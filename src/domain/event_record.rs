use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::clock::Clock;
use crate::domain::operation::OperationCode;

const EVENT_FRAME_KEY: &str = "evento";

const ID_KEYS: &[&str] = &["id_evento", "idEvento"];
const TIMESTAMP_KEYS: &[&str] = &["fecha_hora", "fechaHora"];
const DEVICE_KEYS: &[&str] = &["id_dispositivo", "idDispositivo"];
const CLIENT_KEYS: &[&str] = &["id_cliente", "idCliente"];
const OPERATION_KEYS: &[&str] = &["id_operacion", "idOperacion"];
const OBSTACLE_KEYS: &[&str] = &["id_obstaculo", "idObstaculo"];

const NAIVE_TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("event payload must be a JSON object")]
    InvalidPayloadType,
    #[error("history payload must be a JSON array")]
    ExpectedArray,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventId {
    Numeric(i64),
    Opaque(String),
}

impl EventId {
    pub fn as_numeric(&self) -> Option<i64> {
        match self {
            EventId::Numeric(value) => Some(*value),
            EventId::Opaque(_) => None,
        }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventId::Numeric(value) => write!(f, "{value}"),
            EventId::Opaque(value) => f.write_str(value),
        }
    }
}

/// When the event happened. `Arrival` means the payload carried no usable
/// timestamp and the local observation time was substituted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTime {
    Reported(DateTime<Utc>),
    Arrival(DateTime<Utc>),
}

impl EventTime {
    pub fn instant(&self) -> DateTime<Utc> {
        match self {
            EventTime::Reported(value) | EventTime::Arrival(value) => *value,
        }
    }

    pub fn is_approximate(&self) -> bool {
        matches!(self, EventTime::Arrival(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub id_evento: Option<EventId>,
    pub fecha_hora: EventTime,
    pub id_dispositivo: Option<i64>,
    pub id_cliente: Option<i64>,
    pub id_operacion: Option<i64>,
    pub id_obstaculo: Option<i64>,
}

impl EventRecord {
    /// Dash-filled record used when a pushed frame carries no event payload.
    pub fn placeholder<C: Clock + ?Sized>(clock: &C) -> Self {
        Self {
            id_evento: None,
            fecha_hora: EventTime::Arrival(clock.now()),
            id_dispositivo: None,
            id_cliente: None,
            id_operacion: None,
            id_obstaculo: None,
        }
    }

    pub fn dedup_key(&self) -> Option<i64> {
        self.id_evento.as_ref().and_then(EventId::as_numeric)
    }

    pub fn operation(&self) -> Option<OperationCode> {
        self.id_operacion.and_then(OperationCode::from_code)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushFrame {
    Event(EventRecord),
    Other(Value),
}

pub fn decode_event<C: Clock + ?Sized>(
    payload: &Value,
    clock: &C,
) -> Result<EventRecord, DecodeError> {
    let object = payload.as_object().ok_or(DecodeError::InvalidPayloadType)?;

    Ok(EventRecord {
        id_evento: find_value(object, ID_KEYS).and_then(parse_event_id),
        fecha_hora: find_value(object, TIMESTAMP_KEYS)
            .and_then(parse_timestamp)
            .map(EventTime::Reported)
            .unwrap_or_else(|| EventTime::Arrival(clock.now())),
        id_dispositivo: find_integer(object, DEVICE_KEYS),
        id_cliente: find_integer(object, CLIENT_KEYS),
        id_operacion: find_integer(object, OPERATION_KEYS),
        id_obstaculo: find_integer(object, OBSTACLE_KEYS),
    })
}

/// Decodes a history response. Entries that are not objects are skipped so a
/// single bad row does not discard the whole snapshot.
pub fn decode_history<C: Clock + ?Sized>(
    payload: &Value,
    clock: &C,
) -> Result<Vec<EventRecord>, DecodeError> {
    let entries = match payload {
        Value::Array(entries) => entries,
        Value::Null => return Ok(Vec::new()),
        _ => return Err(DecodeError::ExpectedArray),
    };

    let mut records = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        match decode_event(entry, clock) {
            Ok(record) => records.push(record),
            Err(error) => {
                tracing::warn!(index, error = %error, "skipping undecodable history entry");
            }
        }
    }

    Ok(records)
}

pub fn decode_push_frame<C: Clock + ?Sized>(
    text: &str,
    clock: &C,
) -> Result<PushFrame, DecodeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|error| DecodeError::InvalidJson(error.to_string()))?;

    match value.get(EVENT_FRAME_KEY) {
        Some(payload @ Value::Object(_)) => decode_event(payload, clock).map(PushFrame::Event),
        _ => Ok(PushFrame::Other(value)),
    }
}

fn find_value<'a>(object: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .find_map(|alias| object.get(*alias))
        .filter(|value| !value.is_null())
}

fn find_integer(object: &Map<String, Value>, aliases: &[&str]) -> Option<i64> {
    find_value(object, aliases).and_then(parse_integer)
}

fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|value| value.is_finite() && value.fract() == 0.0)
                .map(|value| value as i64)
        }),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn parse_event_id(value: &Value) -> Option<EventId> {
    if let Some(numeric) = parse_integer(value) {
        return Some(EventId::Numeric(numeric));
    }

    match value {
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() || trimmed == "-" {
                None
            } else {
                Some(EventId::Opaque(trimmed.to_string()))
            }
        }
        _ => None,
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let parsed = match value {
        Value::String(text) => parse_timestamp_text(text.trim()),
        Value::Number(number) => number
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    };

    if parsed.is_none() {
        tracing::debug!(value = %value, "unparseable event timestamp, using arrival time");
    }

    parsed
}

fn parse_timestamp_text(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }

    NAIVE_TIMESTAMP_FORMATS.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(text, format)
            .ok()
            .map(|naive| naive.and_utc())
    })
}
