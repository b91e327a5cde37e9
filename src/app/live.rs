use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::adapters::monitor_ws::{
    Connector, NORMAL_CLOSURE, SignalSink, TransportHandle, TransportSignal,
};
use crate::app::feed::{FeedFault, FeedNotification, SharedFeed};
use crate::domain::clock::Clock;
use crate::domain::connection_state::{ConnectionState, ConnectionStateMachine, SessionId};
use crate::domain::event_record::{EventRecord, PushFrame, decode_push_frame};

const CLOSE_REASON: &str = "client";

/// What to do with a well-formed push frame that carries no `evento` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushPolicy {
    #[default]
    Drop,
    Placeholder,
}

impl FromStr for PushPolicy {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(PushPolicy::Drop),
            "placeholder" => Ok(PushPolicy::Placeholder),
            other => Err(format!("unknown push policy '{other}'")),
        }
    }
}

struct LiveState {
    machine: ConnectionStateMachine,
    handle: Option<(SessionId, Box<dyn TransportHandle>)>,
}

struct LiveShared {
    state: Mutex<LiveState>,
    feed: SharedFeed,
    clock: Arc<dyn Clock>,
    policy: PushPolicy,
}

/// Owns the monitor socket and its state machine. `connect` and `disconnect`
/// are idempotent and never fail.
pub struct LiveConnection<C> {
    connector: C,
    shared: Arc<LiveShared>,
}

impl<C> LiveConnection<C>
where
    C: Connector,
{
    pub fn new(connector: C, feed: SharedFeed, clock: Arc<dyn Clock>, policy: PushPolicy) -> Self {
        Self {
            connector,
            shared: Arc::new(LiveShared {
                state: Mutex::new(LiveState {
                    machine: ConnectionStateMachine::new(),
                    handle: None,
                }),
                feed,
                clock,
                policy,
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock_state().machine.state()
    }

    pub fn connect(&self) {
        let Some(session) = self.shared.lock_state().machine.begin_connect() else {
            tracing::debug!("connect ignored, session already active");
            return;
        };

        tracing::info!(session = session.0, "live connection connecting");
        self.shared.emit_state(ConnectionState::Connecting);

        let shared = Arc::clone(&self.shared);
        let sink: SignalSink = Arc::new(move |signal| shared.handle_signal(session, signal));
        let handle = self.connector.open(session, sink);

        let mut state = self.shared.lock_state();
        let still_wanted = state.machine.is_current(session)
            && matches!(
                state.machine.state(),
                ConnectionState::Connecting | ConnectionState::Connected
            );

        if still_wanted {
            state.handle = Some((session, handle));
        } else {
            drop(state);
            tracing::debug!(session = session.0, "session superseded while opening");
            handle.close(NORMAL_CLOSURE, CLOSE_REASON);
        }
    }

    pub fn disconnect(&self) {
        let handle = {
            let mut state = self.shared.lock_state();
            let Some(session) = state.machine.begin_disconnect() else {
                tracing::debug!("disconnect ignored, nothing to close");
                return;
            };
            tracing::info!(session = session.0, "live connection closing");
            state.handle.take()
        };

        self.shared.emit_state(ConnectionState::Closing);

        if let Some((_, handle)) = handle {
            handle.close(NORMAL_CLOSURE, CLOSE_REASON);
        }
    }
}

impl<C> Drop for LiveConnection<C> {
    fn drop(&mut self) {
        if let Some((_, handle)) = self.shared.lock_state().handle.take() {
            handle.close(NORMAL_CLOSURE, CLOSE_REASON);
        }
    }
}

impl LiveShared {
    // state transitions never panic while holding the lock, so a poisoned
    // guard still holds a consistent machine
    fn lock_state(&self) -> MutexGuard<'_, LiveState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit_state(&self, state: ConnectionState) {
        self.feed
            .notifier()
            .emit(FeedNotification::ConnectionChanged(state));
    }

    fn handle_signal(&self, session: SessionId, signal: TransportSignal) {
        match signal {
            TransportSignal::Opened => {
                if self.lock_state().machine.opened(session) {
                    tracing::info!(session = session.0, "live connection established");
                    self.emit_state(ConnectionState::Connected);
                }
            }
            TransportSignal::Text(text) => self.handle_frame(session, &text),
            TransportSignal::Error(message) => {
                if self.lock_state().machine.is_current(session) {
                    tracing::warn!(session = session.0, error = %message, "live transport error");
                    self.feed.notifier().fault(FeedFault::Transport(message));
                }
            }
            TransportSignal::Closed { code, reason } => {
                let closed = {
                    let mut state = self.lock_state();
                    let closed = state.machine.closed(session);
                    if closed {
                        state.handle = None;
                    }
                    closed
                };

                if closed {
                    tracing::info!(session = session.0, ?code, reason = %reason, "live connection closed");
                    self.emit_state(ConnectionState::Disconnected);
                } else {
                    tracing::debug!(session = session.0, "ignoring close of stale session");
                }
            }
        }
    }

    fn handle_frame(&self, session: SessionId, text: &str) {
        {
            let state = self.lock_state();
            if !state.machine.is_current(session)
                || state.machine.state() != ConnectionState::Connected
            {
                tracing::debug!(session = session.0, "dropping frame from inactive session");
                return;
            }
        }

        let record = match decode_push_frame(text, self.clock.as_ref()) {
            Ok(PushFrame::Event(record)) => record,
            Ok(PushFrame::Other(value)) => match self.policy {
                PushPolicy::Drop => {
                    tracing::debug!(frame = %value, "dropping push frame without event payload");
                    return;
                }
                PushPolicy::Placeholder => EventRecord::placeholder(self.clock.as_ref()),
            },
            Err(error) => {
                tracing::warn!(session = session.0, error = %error, "dropping undecodable push frame");
                self.feed.notifier().fault(FeedFault::Decode(error.to_string()));
                return;
            }
        };

        if let Err(error) = self.feed.prepend(record) {
            tracing::error!(error = %error, "failed to apply pushed event");
        }
    }
}
