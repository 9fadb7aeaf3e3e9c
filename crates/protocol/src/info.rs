//! Strukturierte Status- und Fehlerinformation (`{code, message, params}`)
//!
//! Wird fuer HTTP-Fehlerantworten, Fortschrittsmeldungen des Handshakes
//! und Join-Statusmeldungen verwendet.

use serde::{Deserialize, Serialize};

/// Bekannte Codes
pub mod codes {
    pub const PERFORMING_LOGIN: &str = "PerformingLogin";
    pub const AWAITING_SERVER_RESPONSE: &str = "AwaitingServerResponse";
    pub const WAITING_FOR_HOST: &str = "WaitingForHost";
    pub const INVALID_SERVER_VERSION: &str = "InvalidServerVersion";
    pub const INCOMPATIBLE_PROTOCOL_VERSIONS: &str = "IncompatibleProtocolVersions";
    pub const JOIN_REJECTED: &str = "JoinRejected";
    pub const JOIN_TIMEOUT: &str = "JoinTimeout";
    pub const ROOM_NOT_FOUND: &str = "RoomNotFound";
    pub const REQUEST_TIMED_OUT: &str = "RequestTimedOut";
    pub const PEER_NOT_FOUND: &str = "PeerNotFound";
    pub const UNAUTHORIZED: &str = "Unauthorized";
    pub const TOKEN_NOT_FOUND: &str = "TokenNotFound";
    pub const INTERNAL_ERROR: &str = "InternalError";
}

/// Status- oder Fehlerinformation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub params: Vec<String>,
}

impl Info {
    pub fn neu(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            params: Vec::new(),
        }
    }

    pub fn mit_params(mut self, params: Vec<String>) -> Self {
        self.params = params;
        self
    }
}

impl std::fmt::Display for Info {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
