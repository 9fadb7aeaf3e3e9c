//! Fehlertypen fuer den Sitzungsaufbau

use oct_crypto::CryptoError;
use oct_protocol::info::{codes, Info};
use oct_protocol::TransportError;
use thiserror::Error;

/// Fehler beim Sitzungsaufbau und auf der Client-Verbindung
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("Ungueltige Server-Antwort: {0}")]
    InvalidServerResponse(String),

    #[error("{message} ({code})")]
    ServerError {
        code: String,
        message: String,
        params: Vec<String>,
    },

    #[error("Ungueltige Protokollversion vom Server: {0}")]
    InvalidServerVersion(String),

    #[error("Inkompatible Protokollversionen: Client {client}, Server {server}")]
    IncompatibleProtocolVersions { client: String, server: String },

    #[error("Kein passender Transport (Server bietet {angeboten:?})")]
    NoFittingTransport { angeboten: Vec<String> },

    #[error("Kein Auth-Token vorhanden")]
    NoAuthToken,

    #[error("Zeitueberschreitung bei Anfrage")]
    RequestTimedOut,

    #[error("Krypto-Backend nicht konfiguriert")]
    CryptoUnavailable,

    #[error("Vorgang abgebrochen")]
    Cancelled,

    #[error("Ungueltige Client-Konfiguration: {0}")]
    Konfiguration(String),

    #[error("HTTP-Fehler: {0}")]
    Http(String),

    #[error("Transport-Fehler: {0}")]
    Transport(#[from] TransportError),

    #[error("Krypto-Fehler: {0}")]
    Crypto(CryptoError),
}

impl From<CryptoError> for HandshakeError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::CryptoUnavailable => Self::CryptoUnavailable,
            andere => Self::Crypto(andere),
        }
    }
}

impl From<Info> for HandshakeError {
    fn from(info: Info) -> Self {
        Self::ServerError {
            code: info.code,
            message: info.message,
            params: info.params,
        }
    }
}

impl HandshakeError {
    /// Strukturierte Form fuer Fortschritts-Reporter
    pub fn info(&self) -> Info {
        match self {
            Self::ServerError {
                code,
                message,
                params,
            } => Info::neu(code.clone(), message.clone()).mit_params(params.clone()),
            Self::InvalidServerVersion(v) => {
                Info::neu(codes::INVALID_SERVER_VERSION, self.to_string()).mit_params(vec![v.clone()])
            }
            Self::IncompatibleProtocolVersions { client, server } => {
                Info::neu(codes::INCOMPATIBLE_PROTOCOL_VERSIONS, self.to_string())
                    .mit_params(vec![client.clone(), server.clone()])
            }
            Self::RequestTimedOut => Info::neu(codes::REQUEST_TIMED_OUT, self.to_string()),
            andere => Info::neu(andere.code(), andere.to_string()),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::InvalidServerResponse(_) => "InvalidServerResponse",
            Self::ServerError { .. } => "ServerError",
            Self::InvalidServerVersion(_) => codes::INVALID_SERVER_VERSION,
            Self::IncompatibleProtocolVersions { .. } => codes::INCOMPATIBLE_PROTOCOL_VERSIONS,
            Self::NoFittingTransport { .. } => "NoFittingTransport",
            Self::NoAuthToken => "NoAuthToken",
            Self::RequestTimedOut => codes::REQUEST_TIMED_OUT,
            Self::CryptoUnavailable => "CryptoUnavailable",
            Self::Cancelled => "Cancelled",
            Self::Konfiguration(_) => "InvalidConfiguration",
            Self::Http(_) => "HttpError",
            Self::Transport(_) => "TransportError",
            Self::Crypto(_) => "CryptoError",
        }
    }
}

pub type HandshakeResult<T> = Result<T, HandshakeError>;
