//! The per-session state machine.

/// Where a session is in the BNCS handshake / chat lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    BncsPing,
    AuthCheckSent,
    AuthCheckReceived,
    AuthInfoReceived,
    LoggedIn,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Connected => "CONNECTED",
            SessionState::BncsPing => "BNCS_PING",
            SessionState::AuthCheckSent => "AUTH_CHECK_SENT",
            SessionState::AuthCheckReceived => "AUTH_CHECK_RECEIVED",
            SessionState::AuthInfoReceived => "AUTH_INFO_RECEIVED",
            SessionState::LoggedIn => "LOGGED_IN",
            SessionState::Closed => "CLOSED",
        }
    }

    /// Whether `opcode` is a valid message to receive while in this state.
    /// This is the authoritative edge list from the state table; anything
    /// not listed here is a protocol violation that closes the session.
    pub fn accepts(&self, opcode: u8) -> bool {
        use crate::wire::opcodes::*;
        match (self, opcode) {
            (SessionState::Connected, SID_BNCS_PING) => true,
            (SessionState::AuthCheckSent, SID_AUTH_CHECK) => true,
            (SessionState::AuthCheckReceived, SID_AUTH_INFO) => true,
            (SessionState::AuthInfoReceived, SID_LOGON_PROOF) => true,
            (SessionState::LoggedIn, SID_ENTERCHAT) => true,
            (SessionState::LoggedIn, SID_CHATCOMMAND) => true,
            (SessionState::LoggedIn, SID_PING) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
