use chrono::{Local, SecondsFormat};

use crate::app::feed::FeedNotification;
use crate::domain::event_record::EventRecord;

const MISSING: &str = "-";

pub fn render_record(record: &EventRecord) -> String {
    let time = record
        .fecha_hora
        .instant()
        .with_timezone(&Local)
        .to_rfc3339_opts(SecondsFormat::Secs, false);
    let approximate = if record.fecha_hora.is_approximate() {
        "~"
    } else {
        ""
    };
    let operation = match (record.operation(), record.id_operacion) {
        (Some(operation), _) => operation.label().to_string(),
        (None, Some(code)) => code.to_string(),
        (None, None) => MISSING.to_string(),
    };

    format!(
        "#{} {approximate}{time} device={} client={} op={operation} obstacle={}",
        display_or_dash(record.id_evento.as_ref()),
        display_or_dash(record.id_dispositivo.as_ref()),
        display_or_dash(record.id_cliente.as_ref()),
        display_or_dash(record.id_obstaculo.as_ref()),
    )
}

pub fn render_count(event_count: u64) -> String {
    let suffix = if event_count == 1 { "" } else { "s" };
    format!("{event_count} evento{suffix}")
}

pub fn render_notification(notification: &FeedNotification) -> Vec<String> {
    match notification {
        FeedNotification::Replaced {
            records,
            event_count,
        } => {
            let mut lines = vec![format!("-- history ({}) --", render_count(*event_count))];
            if records.is_empty() {
                lines.push("no events found for this device".to_string());
            }
            lines.extend(records.iter().map(render_record));
            lines
        }
        FeedNotification::RecordAdded {
            record,
            event_count,
        } => vec![format!(
            "{} [{}]",
            render_record(record),
            render_count(*event_count)
        )],
        FeedNotification::Cleared => vec!["-- feed cleared --".to_string()],
        FeedNotification::ConnectionChanged(state) => vec![format!("-- websocket {state} --")],
        FeedNotification::Fault(fault) => vec![format!("!! {fault}")],
    }
}

fn display_or_dash<T: ToString>(value: Option<&T>) -> String {
    value
        .map(ToString::to_string)
        .unwrap_or_else(|| MISSING.to_string())
}
