//! HTTP-Fehler der Control-Plane
//!
//! Jeder Fehler wird als `Info`-JSON (`{code, message, params}`) mit
//! passendem Statuscode ausgeliefert.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use oct_core::RoomId;
use oct_protocol::info::{codes, Info};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiFehler {
    #[error("Nicht angemeldet oder Login abgelaufen")]
    NichtAutorisiert,

    #[error("Token unbekannt oder abgelaufen")]
    TokenNichtGefunden,

    #[error("Raum nicht gefunden: {0}")]
    RaumNichtGefunden(RoomId),

    #[error("Ungueltige Anfrage: {0}")]
    UngueltigeAnfrage(String),

    #[error("Interner Fehler: {0}")]
    Intern(String),
}

pub type ApiResult<T> = Result<T, ApiFehler>;

impl ApiFehler {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NichtAutorisiert => StatusCode::UNAUTHORIZED,
            Self::TokenNichtGefunden | Self::RaumNichtGefunden(_) => StatusCode::NOT_FOUND,
            Self::UngueltigeAnfrage(_) => StatusCode::BAD_REQUEST,
            Self::Intern(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn info(&self) -> Info {
        let code = match self {
            Self::NichtAutorisiert => codes::UNAUTHORIZED,
            Self::TokenNichtGefunden => codes::TOKEN_NOT_FOUND,
            Self::RaumNichtGefunden(_) => codes::ROOM_NOT_FOUND,
            Self::UngueltigeAnfrage(_) => "InvalidRequest",
            Self::Intern(_) => codes::INTERNAL_ERROR,
        };
        let info = Info::neu(code, self.to_string());
        match self {
            Self::RaumNichtGefunden(id) => info.mit_params(vec![id.inner().to_string()]),
            _ => info,
        }
    }
}

impl IntoResponse for ApiFehler {
    fn into_response(self) -> Response {
        if matches!(self, Self::Intern(_)) {
            tracing::error!(fehler = %self, "Interner Fehler in der Control-Plane");
        }
        (self.status(), Json(self.info())).into_response()
    }
}
