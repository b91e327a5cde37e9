use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use crate::domain::connection_state::SessionId;

pub const NORMAL_CLOSURE: u16 = 1000;

const CLOSE_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle and data signals a transport session reports back to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
    Opened,
    Text(String),
    Error(String),
    Closed { code: Option<u16>, reason: String },
}

pub type SignalSink = Arc<dyn Fn(TransportSignal) + Send + Sync>;

/// Opens transport sessions. Opening must not block: the outcome is reported
/// later through the sink (`Opened`, or `Error` followed by `Closed`).
pub trait Connector: Send + Sync + 'static {
    fn open(&self, session: SessionId, signals: SignalSink) -> Box<dyn TransportHandle>;
}

pub trait TransportHandle: Send {
    fn close(self: Box<Self>, code: u16, reason: &str);
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket connector requires a running tokio runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

#[derive(Debug)]
struct CloseRequest {
    code: u16,
    reason: String,
}

#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    runtime: Handle,
}

impl WsConnector {
    pub fn new(url: &str) -> Result<Self, TransportError> {
        Ok(Self {
            url: url.to_string(),
            runtime: Handle::try_current()?,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Connector for WsConnector {
    fn open(&self, session: SessionId, signals: SignalSink) -> Box<dyn TransportHandle> {
        let (close_tx, close_rx) = oneshot::channel();

        tracing::debug!(session = session.0, url = %self.url, "opening websocket session");
        self.runtime
            .spawn(run_session(self.url.clone(), session, signals, close_rx));

        Box::new(WsHandle { close_tx })
    }
}

struct WsHandle {
    close_tx: oneshot::Sender<CloseRequest>,
}

impl TransportHandle for WsHandle {
    fn close(self: Box<Self>, code: u16, reason: &str) {
        // the session task may already be gone; nothing left to close then
        let _ = self.close_tx.send(CloseRequest {
            code,
            reason: reason.to_string(),
        });
    }
}

async fn run_session(
    url: String,
    session: SessionId,
    signals: SignalSink,
    mut close_rx: oneshot::Receiver<CloseRequest>,
) {
    let stream = tokio::select! {
        connected = tokio_tungstenite::connect_async(url.as_str()) => match connected {
            Ok((stream, _response)) => stream,
            Err(error) => {
                signals(TransportSignal::Error(error.to_string()));
                signals(TransportSignal::Closed {
                    code: None,
                    reason: "connect failed".to_string(),
                });
                return;
            }
        },
        request = &mut close_rx => {
            let request = close_request_or_default(request);
            signals(TransportSignal::Closed {
                code: Some(request.code),
                reason: request.reason,
            });
            return;
        }
    };

    tracing::info!(session = session.0, "websocket session open");
    signals(TransportSignal::Opened);

    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            request = &mut close_rx => {
                let request = close_request_or_default(request);
                let frame = CloseFrame {
                    code: CloseCode::from(request.code),
                    reason: request.reason.clone().into(),
                };

                if let Err(error) = write.send(Message::Close(Some(frame))).await {
                    signals(TransportSignal::Error(error.to_string()));
                } else {
                    let acknowledged = tokio::time::timeout(CLOSE_ACK_TIMEOUT, async {
                        while let Some(message) = read.next().await {
                            match message {
                                Ok(Message::Close(_)) | Err(_) => break,
                                Ok(_) => continue,
                            }
                        }
                    })
                    .await;

                    if acknowledged.is_err() {
                        tracing::warn!(session = session.0, "close handshake timed out");
                    }
                }

                signals(TransportSignal::Closed {
                    code: Some(request.code),
                    reason: request.reason,
                });
                return;
            }
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => signals(TransportSignal::Text(text)),
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|frame| (Some(u16::from(frame.code)), frame.reason.into_owned()))
                        .unwrap_or((None, String::new()));
                    signals(TransportSignal::Closed { code, reason });
                    return;
                }
                Some(Ok(Message::Binary(payload))) => {
                    tracing::debug!(session = session.0, bytes = payload.len(), "ignoring binary frame");
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    signals(TransportSignal::Error(error.to_string()));
                    signals(TransportSignal::Closed {
                        code: None,
                        reason: "transport error".to_string(),
                    });
                    return;
                }
                None => {
                    signals(TransportSignal::Closed {
                        code: None,
                        reason: "stream ended".to_string(),
                    });
                    return;
                }
            }
        }
    }
}

fn close_request_or_default(
    request: Result<CloseRequest, oneshot::error::RecvError>,
) -> CloseRequest {
    request.unwrap_or_else(|_| CloseRequest {
        code: NORMAL_CLOSURE,
        reason: "handle dropped".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;

    use super::{Connector, NORMAL_CLOSURE, SignalSink, TransportSignal, WsConnector};
    use crate::domain::connection_state::SessionId;

    fn channel_sink() -> (SignalSink, mpsc::UnboundedReceiver<TransportSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink: SignalSink = Arc::new(move |signal| {
            let _ = tx.send(signal);
        });
        (sink, rx)
    }

    async fn next_signal(rx: &mut mpsc::UnboundedReceiver<TransportSignal>) -> TransportSignal {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("signal should arrive in time")
            .expect("signal channel should stay open")
    }

    #[tokio::test]
    async fn relays_frames_and_closes_gracefully() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let address = listener.local_addr().expect("addr should be available");

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.expect("client should connect");
            let mut ws = tokio_tungstenite::accept_async(socket)
                .await
                .expect("handshake should succeed");
            ws.send(Message::Text(r#"{"evento":{"id_evento":1}}"#.to_string()))
                .await
                .expect("frame should be sent");

            let mut close_code = None;
            while let Some(Ok(message)) = ws.next().await {
                if let Message::Close(Some(frame)) = message {
                    close_code = Some(u16::from(frame.code));
                }
            }
            close_code
        });

        let connector = WsConnector::new(&format!("ws://{address}/ws/monitor"))
            .expect("runtime should be available");
        let (sink, mut rx) = channel_sink();
        let handle = connector.open(SessionId(1), sink);

        assert_eq!(next_signal(&mut rx).await, TransportSignal::Opened);
        assert_eq!(
            next_signal(&mut rx).await,
            TransportSignal::Text(r#"{"evento":{"id_evento":1}}"#.to_string())
        );

        handle.close(NORMAL_CLOSURE, "client");

        assert_eq!(
            next_signal(&mut rx).await,
            TransportSignal::Closed {
                code: Some(NORMAL_CLOSURE),
                reason: "client".to_string(),
            }
        );
        assert_eq!(
            server.await.expect("server task should finish"),
            Some(NORMAL_CLOSURE)
        );
    }

    #[tokio::test]
    async fn failed_connect_reports_error_then_close() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let address = listener.local_addr().expect("addr should be available");
        drop(listener);

        let connector = WsConnector::new(&format!("ws://{address}/ws/monitor"))
            .expect("runtime should be available");
        let (sink, mut rx) = channel_sink();
        let _handle = connector.open(SessionId(1), sink);

        assert!(matches!(
            next_signal(&mut rx).await,
            TransportSignal::Error(_)
        ));
        assert!(matches!(
            next_signal(&mut rx).await,
            TransportSignal::Closed { code: None, .. }
        ));
    }
}
