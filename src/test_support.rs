use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::adapters::device_api::{ApiError, HistoryLoader};
use crate::adapters::monitor_ws::{Connector, SignalSink, TransportHandle, TransportSignal};
use crate::domain::clock::Clock;
use crate::domain::connection_state::SessionId;
use crate::domain::event_record::{EventId, EventRecord, EventTime};

pub struct FakeClock {
    now: DateTime<Utc>,
}

impl FakeClock {
    pub fn at_millis(millis: i64) -> Self {
        Self {
            now: DateTime::<Utc>::from_timestamp_millis(millis).expect("timestamp should be valid"),
        }
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }
}

pub fn numbered_record(id: i64) -> EventRecord {
    EventRecord {
        id_evento: Some(EventId::Numeric(id)),
        fecha_hora: EventTime::Reported(
            DateTime::<Utc>::from_timestamp(1_700_000_000 + id, 0).expect("timestamp should be valid"),
        ),
        id_dispositivo: Some(1),
        id_cliente: Some(1),
        id_operacion: Some(1),
        id_obstaculo: None,
    }
}

pub fn anonymous_record() -> EventRecord {
    EventRecord::placeholder(&FakeClock::at_millis(0))
}

pub fn drain<T>(rx: &mut UnboundedReceiver<T>) -> Vec<T> {
    let mut items = Vec::new();
    while let Ok(item) = rx.try_recv() {
        items.push(item);
    }
    items
}

/// Connector that never touches the network. Tests drive each opened session
/// by index through [`RecordingConnector::signal`].
#[derive(Clone, Default)]
pub struct RecordingConnector {
    sinks: Arc<Mutex<Vec<SignalSink>>>,
    closes: Arc<Mutex<Vec<(usize, u16, String)>>>,
}

impl RecordingConnector {
    pub fn open_count(&self) -> usize {
        self.sinks.lock().expect("sinks lock").len()
    }

    pub fn closes(&self) -> Vec<(usize, u16, String)> {
        self.closes.lock().expect("closes lock").clone()
    }

    pub fn signal(&self, index: usize, signal: TransportSignal) {
        let sink = Arc::clone(&self.sinks.lock().expect("sinks lock")[index]);
        sink(signal);
    }
}

impl Connector for RecordingConnector {
    fn open(&self, _session: SessionId, signals: SignalSink) -> Box<dyn TransportHandle> {
        let mut sinks = self.sinks.lock().expect("sinks lock");
        sinks.push(signals);
        Box::new(RecordingHandle {
            index: sinks.len() - 1,
            closes: Arc::clone(&self.closes),
        })
    }
}

struct RecordingHandle {
    index: usize,
    closes: Arc<Mutex<Vec<(usize, u16, String)>>>,
}

impl TransportHandle for RecordingHandle {
    fn close(self: Box<Self>, code: u16, reason: &str) {
        self.closes
            .lock()
            .expect("closes lock")
            .push((self.index, code, reason.to_string()));
    }
}

pub struct CountingLoader {
    records: Option<Vec<EventRecord>>,
    calls: AtomicUsize,
}

impl CountingLoader {
    pub fn returning(records: Vec<EventRecord>) -> Self {
        Self {
            records: Some(records),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            records: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistoryLoader for CountingLoader {
    async fn load_history(
        &self,
        _device_id: NonZeroU32,
        _limit: NonZeroU32,
    ) -> Result<Vec<EventRecord>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.records.clone().ok_or_else(|| ApiError::Network {
            message: "connection refused".to_string(),
        })
    }
}

/// Minimal HTTP/1.1 responder: serves the canned `(status, body)` pairs on
/// consecutive connections and records each raw request.
pub struct HttpResponder {
    port: u16,
    handle: JoinHandle<Vec<String>>,
}

impl HttpResponder {
    pub fn spawn(responses: Vec<(u16, &'static str)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("responder should bind");
        let port = listener.local_addr().expect("addr should be available").port();

        let handle = std::thread::spawn(move || {
            let mut requests = Vec::new();
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().expect("client should connect");
                stream
                    .set_read_timeout(Some(Duration::from_secs(5)))
                    .expect("read timeout should be configurable");
                requests.push(read_request(&mut stream));

                let response = format!(
                    "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    reason_phrase(status),
                    body.len()
                );
                stream
                    .write_all(response.as_bytes())
                    .expect("response should be written");
            }
            requests
        });

        Self { port, handle }
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn finish(self) -> Vec<String> {
        self.handle.join().expect("responder thread should finish")
    }
}

pub fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
    let port = listener.local_addr().expect("addr should be available").port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}

fn read_request(stream: &mut TcpStream) -> String {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 1024];

    loop {
        let size = stream.read(&mut chunk).expect("request should be readable");
        if size == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..size]);

        let text = String::from_utf8_lossy(&buffer);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buffer.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }

    String::from_utf8_lossy(&buffer).into_owned()
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        422 => "Unprocessable Entity",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
