//! HTTP-Control-Plane und WebSocket-Endpunkt

pub mod login;
pub mod raum;
pub mod routes;
pub mod ws;

use axum::http::HeaderMap;
use oct_observability::RelayMetrics;
use oct_protocol::transport::header;
use oct_protocol::types::User;
use oct_relay::RoomManager;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ServerConfig;
use crate::fehler::{ApiFehler, ApiResult};
use crate::sitzung::SitzungsSpeicher;

/// Cookie fuer die Cookie-Authentifizierung
pub const LOGIN_COOKIE: &str = "oct-jwt";

/// Axum-State der Control-Plane
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub sitzungen: Arc<SitzungsSpeicher>,
    pub raeume: RoomManager,
    pub metriken: RelayMetrics,
}

impl AppState {
    pub fn poll_halten(&self) -> Duration {
        Duration::from_millis(self.config.sitzung.poll_halten_ms)
    }

    pub fn beitritt_timeout(&self) -> Duration {
        Duration::from_millis(self.config.sitzung.beitritt_timeout_ms)
    }
}

/// Login-Token aus `x-oct-jwt`, sonst aus dem Login-Cookie
pub fn login_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers.get(header::JWT).and_then(|v| v.to_str().ok()) {
        return Some(token.to_string());
    }
    headers
        .get_all(axum::http::header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|paar| paar.trim().split_once('='))
        .find(|(name, _)| *name == LOGIN_COOKIE)
        .map(|(_, wert)| wert.to_string())
}

/// Angemeldeter Benutzer der Anfrage
pub fn benutzer_aus_headers(headers: &HeaderMap, state: &AppState) -> ApiResult<User> {
    login_token(headers)
        .and_then(|token| state.sitzungen.benutzer(&token))
        .ok_or(ApiFehler::NichtAutorisiert)
}
