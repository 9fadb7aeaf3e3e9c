//! Login-Endpunkte und Server-Metadaten
//!
//! Ablauf: `initial` liefert ein Poll-Token, `simple` schliesst den Login
//! mit Name (und optional E-Mail) ab, `poll` liefert danach das
//! Login-Token.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use oct_protocol::transport::WEBSOCKET_ID;
use oct_protocol::types::{
    AuthMetadata, AuthProvider, LoginInitialResponse, LoginPollResponse, LoginValidateResponse,
    ProtocolServerMetaData, SimpleLoginRequest, User,
};
use oct_protocol::PROTOKOLL_VERSION;
use serde::Deserialize;

use crate::api::{benutzer_aus_headers, login_token, AppState, LOGIN_COOKIE};
use crate::fehler::{ApiFehler, ApiResult};

/// Pfad der einfachen Login-Seite
pub const SIMPLE_LOGIN_PFAD: &str = "/api/login/simple";

/// `GET /api/meta`
pub async fn meta(State(state): State<AppState>) -> Json<ProtocolServerMetaData> {
    Json(ProtocolServerMetaData {
        version: PROTOKOLL_VERSION.to_string(),
        transports: vec![WEBSOCKET_ID.to_string()],
        owner: state.config.server.betreiber.clone(),
    })
}

/// `POST /api/login/initial`
pub async fn login_initial(State(state): State<AppState>) -> Json<LoginInitialResponse> {
    let poll_token = state.sitzungen.login_starten();
    tracing::debug!("Login gestartet");
    Json(LoginInitialResponse {
        poll_token,
        auth: AuthMetadata {
            login_page_url: Some(SIMPLE_LOGIN_PFAD.to_string()),
            providers: vec![AuthProvider {
                name: "simple".to_string(),
                endpoint: SIMPLE_LOGIN_PFAD.to_string(),
            }],
        },
    })
}

/// `POST /api/login/simple`
pub async fn login_simple(
    State(state): State<AppState>,
    Json(anfrage): Json<SimpleLoginRequest>,
) -> ApiResult<StatusCode> {
    let name = anfrage.user.trim();
    if name.is_empty() {
        return Err(ApiFehler::UngueltigeAnfrage("Benutzername fehlt".into()));
    }
    state.sitzungen.login_abschliessen(
        &anfrage.token,
        User {
            name: name.to_string(),
            email: anfrage.email.filter(|e| !e.trim().is_empty()),
        },
    )?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollParameter {
    #[serde(default)]
    pub use_cookie: bool,
}

/// `POST /api/login/poll/:token`
pub async fn login_poll(
    State(state): State<AppState>,
    Path(poll_token): Path<String>,
    Query(parameter): Query<PollParameter>,
) -> ApiResult<Response> {
    let Some(token) = state
        .sitzungen
        .login_pollen(&poll_token, state.poll_halten())
        .await?
    else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let mut antwort = Json(LoginPollResponse {
        login_token: Some(token.clone()),
    })
    .into_response();

    if parameter.use_cookie {
        let cookie = format!("{LOGIN_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax");
        let wert = HeaderValue::from_str(&cookie)
            .map_err(|e| ApiFehler::Intern(format!("Cookie: {e}")))?;
        antwort.headers_mut().insert(header::SET_COOKIE, wert);
    }
    Ok(antwort)
}

/// `POST /api/login/validate`
pub async fn login_validate(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<LoginValidateResponse> {
    Json(LoginValidateResponse {
        valid: benutzer_aus_headers(&headers, &state).is_ok(),
    })
}

/// `POST /api/logout`
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = login_token(&headers) {
        state.sitzungen.abmelden(&token);
    }
    let loeschen = format!("{LOGIN_COOKIE}=; Path=/; HttpOnly; Max-Age=0");
    match HeaderValue::from_str(&loeschen) {
        Ok(wert) => (StatusCode::OK, [(header::SET_COOKIE, wert)]).into_response(),
        Err(_) => StatusCode::OK.into_response(),
    }
}
