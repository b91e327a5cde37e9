use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closing => "closing",
        };
        f.write_str(label)
    }
}

/// Identifies one transport session. Signals tagged with a session that is no
/// longer current are stale and must be ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
    session: Option<SessionId>,
    next_session: u64,
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            session: None,
            next_session: 1,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    pub fn is_current(&self, session: SessionId) -> bool {
        self.session == Some(session)
    }

    /// Returns the new session to open, or `None` when a session is already
    /// connecting or connected. Connecting while a previous session is still
    /// closing starts a fresh session and orphans the old one.
    pub fn begin_connect(&mut self) -> Option<SessionId> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => None,
            ConnectionState::Disconnected | ConnectionState::Closing => {
                let session = SessionId(self.next_session);
                self.next_session += 1;
                self.session = Some(session);
                self.state = ConnectionState::Connecting;
                Some(session)
            }
        }
    }

    /// Returns the session that must be closed, or `None` when there is
    /// nothing to close.
    pub fn begin_disconnect(&mut self) -> Option<SessionId> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                self.state = ConnectionState::Closing;
                self.session
            }
            ConnectionState::Disconnected | ConnectionState::Closing => None,
        }
    }

    pub fn opened(&mut self, session: SessionId) -> bool {
        if self.is_current(session) && self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Connected;
            return true;
        }
        false
    }

    pub fn closed(&mut self, session: SessionId) -> bool {
        if !self.is_current(session) || self.state == ConnectionState::Disconnected {
            return false;
        }

        self.state = ConnectionState::Disconnected;
        self.session = None;
        true
    }
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
